/// Error types shared by the connectivity manager, telemetry client and configuration
use thiserror::Error;

/// Failure reported by the wireless driver collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The network rejected the credentials or could not be found
    #[error("join rejected: {0}")]
    Rejected(String),

    /// Any other driver-level failure
    #[error("driver failure: {0}")]
    Other(String),
}

/// Joining a station network failed
///
/// Recoverable: the connectivity manager falls back to the access point and
/// keeps retrying in the background.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// The station interface is already joined to a network
    #[error("already joined a wifi network")]
    AlreadyJoined,

    /// The driver refused the join or a follow-up interface operation
    #[error("join failed: {0}")]
    Driver(#[from] DriverError),
}

/// Starting the access point failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApError {
    /// The access point is already serving clients
    #[error("access point already running")]
    AlreadyRunning,

    /// The driver refused to bring the access point up
    #[error("cannot start access point: {0}")]
    Driver(#[from] DriverError),
}

/// Broker session failure, always resolved by a full reconnect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The configured broker address cannot be used
    #[error("invalid broker address '{0}'")]
    InvalidAddress(String),

    /// The broker refused or did not answer the connection
    #[error("connect failed: {0}")]
    Connect(String),

    /// Subscribing to a topic failed
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Publishing a message failed
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Keepalive could not be sent
    #[error("ping failed: {0}")]
    Ping(String),

    /// The connection dropped or the broker sent something we cannot handle
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

/// Reading or writing configuration failed
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The persisted configuration file could not be read or written
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted configuration file is not a flat JSON object of strings
    #[error("config file is malformed: {0}")]
    Format(#[from] serde_json::Error),

    /// An environment setting has an unusable value
    #[error("invalid value for {key}: '{value}'")]
    InvalidSetting { key: &'static str, value: String },
}
