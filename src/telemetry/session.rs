/// Broker session capability used by the telemetry client
use async_trait::async_trait;

use crate::config::BrokerAddress;
use crate::error::SessionError;

/// A publish received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Outcome of waiting for the next broker event
///
/// Errors (the connection dropped, the broker misbehaved) come back as
/// `Err(SessionError)` from [`BrokerSession::next_event`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Nothing arrived within the event wait
    Timeout,
    /// The broker sent a packet larger than the session accepts
    TooBig,
    /// An application message on one of the subscribed topics
    Publish(InboundMessage),
    /// Protocol traffic with no meaning for the client (acks, pongs)
    Other,
}

/// One connected lifetime of a broker connection
#[async_trait]
pub trait BrokerSession: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError>;

    /// Block until the next event or the event wait expires
    async fn next_event(&mut self) -> Result<SessionEvent, SessionError>;

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError>;

    /// Protocol-level keepalive
    async fn ping(&mut self) -> Result<(), SessionError>;

    /// Close the connection; failures are irrelevant at this point
    async fn disconnect(&mut self);
}

/// Opens broker sessions
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(
        &self,
        address: &BrokerAddress,
        client_id: &str,
    ) -> Result<Box<dyn BrokerSession>, SessionError>;
}
