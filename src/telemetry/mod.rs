pub mod client;
pub mod mqtt;
pub mod routing;
pub mod session;

pub use client::{
    CycleOutcome, SessionEnd, TelemetryClient, TelemetryStarter, PUBLISH_AFTER_TIMEOUTS,
    RECONNECT_DELAY,
};
pub use mqtt::MqttConnector;
pub use routing::{
    route_message, Route, SUBSCRIPTIONS, TOPIC_FORECAST, TOPIC_LOCAL, TOPIC_OUTDOOR, TOPIC_POWER,
};
pub use session::{BrokerConnector, BrokerSession, InboundMessage, SessionEvent};
