pub mod driver;
pub mod loopback;
pub mod manager;

pub use driver::{
    AccessPointConfig, Interface, Ipv4Config, LinkEvent, LogLed, Security, StatusLed, WifiDriver,
};
pub use loopback::LoopbackRadio;
pub use manager::{
    BootOutcome, ConnectivityManager, ConnectivityState, ConnectivityStatus, StationUpHandler,
    JOIN_RETRY_INTERVAL,
};
