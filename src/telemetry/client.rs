/// Broker session loop: subscribe, route inbound data, publish indoor readings
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::{BrokerAddress, ConfigStore, KEY_BROKER};
use crate::error::SessionError;
use crate::store::TelemetryStore;
use crate::telemetry::routing::{indoor_payload, route_message, SUBSCRIPTIONS, TOPIC_LOCAL};
use crate::telemetry::session::{BrokerConnector, BrokerSession, SessionEvent};
use crate::utils::{Sleeper, TokioSleeper};
use crate::wifi::StationUpHandler;

/// Pause before every reconnect attempt
pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Consecutive event timeouts after which the indoor reading is published
pub const PUBLISH_AFTER_TIMEOUTS: u32 = 5;

/// How a session ended
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The broker sent a packet over the size limit
    TooBig,
    Failed(SessionError),
}

/// Result of one connect/serve/disconnect round
#[derive(Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No broker configured yet
    NoBrokerAddress,
    ConnectFailed(SessionError),
    Disconnected(SessionEnd),
}

/// Long-running broker client
pub struct TelemetryClient {
    store: Arc<TelemetryStore>,
    config: Arc<dyn ConfigStore>,
    connector: Arc<dyn BrokerConnector>,
    sleeper: Arc<dyn Sleeper>,
    client_id: String,
}

impl TelemetryClient {
    pub fn new(
        store: Arc<TelemetryStore>,
        config: Arc<dyn ConfigStore>,
        connector: Arc<dyn BrokerConnector>,
        client_id: impl Into<String>,
    ) -> Self {
        TelemetryClient {
            store,
            config,
            connector,
            sleeper: Arc::new(TokioSleeper),
            client_id: client_id.into(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Reconnect forever
    pub async fn run(self) {
        info!("Telemetry client {} started", self.client_id);
        loop {
            let outcome = self.run_cycle().await;
            debug!("Broker cycle ended: {:?}", outcome);
        }
    }

    /// One connection attempt and, if it succeeds, the whole session
    ///
    /// Every path out of here has already waited `RECONNECT_DELAY`, and the
    /// broker address is re-read from configuration on each call.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(server) = self.config.get(KEY_BROKER).filter(|s| !s.trim().is_empty()) else {
            debug!("No broker address configured");
            self.sleeper.sleep(RECONNECT_DELAY).await;
            return CycleOutcome::NoBrokerAddress;
        };

        let address = match BrokerAddress::parse(&server) {
            Ok(address) => address,
            Err(e) => {
                error!("{}", e);
                self.sleeper.sleep(RECONNECT_DELAY).await;
                return CycleOutcome::ConnectFailed(e);
            }
        };

        let mut session = match self.connector.connect(&address, &self.client_id).await {
            Ok(session) => session,
            Err(e) => {
                error!("Connection to {} failed: {}", address, e);
                self.sleeper.sleep(RECONNECT_DELAY).await;
                return CycleOutcome::ConnectFailed(e);
            }
        };
        info!("Connected to broker {}", address);

        let end = self.serve(session.as_mut()).await;
        match &end {
            SessionEnd::TooBig => warn!("Packet too big, reconnecting"),
            SessionEnd::Failed(e) => warn!("Session error: {}", e),
        }

        session.disconnect().await;
        info!("Disconnected from broker {}", address);
        self.sleeper.sleep(RECONNECT_DELAY).await;

        CycleOutcome::Disconnected(end)
    }

    async fn serve(&self, session: &mut dyn BrokerSession) -> SessionEnd {
        for topic in SUBSCRIPTIONS {
            if let Err(e) = session.subscribe(topic).await {
                return SessionEnd::Failed(e);
            }
            debug!("Subscribed to {}", topic);
        }

        let mut timeouts = 0;
        loop {
            let event = match session.next_event().await {
                Ok(event) => event,
                Err(e) => return SessionEnd::Failed(e),
            };

            match event {
                SessionEvent::Timeout => {
                    if let Err(e) = self.on_timeout(session, &mut timeouts).await {
                        return SessionEnd::Failed(e);
                    }
                }
                SessionEvent::TooBig => return SessionEnd::TooBig,
                SessionEvent::Publish(message) => {
                    let route = route_message(&self.store, &message.topic, &message.payload);
                    debug!("{} -> {:?}", message.topic, route);
                }
                SessionEvent::Other => {}
            }
        }
    }

    /// Publish the indoor reading every `PUBLISH_AFTER_TIMEOUTS` idle waits,
    /// ping otherwise
    async fn on_timeout(
        &self,
        session: &mut dyn BrokerSession,
        timeouts: &mut u32,
    ) -> Result<(), SessionError> {
        *timeouts += 1;

        let indoor = self.store.with_lock(|t| t.indoor());
        if *timeouts >= PUBLISH_AFTER_TIMEOUTS {
            if let Some(payload) = indoor_payload(indoor) {
                session.publish(TOPIC_LOCAL, payload.as_bytes()).await?;
                debug!("Published {}", payload);
                *timeouts = 0;
                return Ok(());
            }
        }

        session.ping().await
    }
}

/// Starts the telemetry client the first time the station link comes up
///
/// Later link-up events (after a reconnect) find the client already running
/// and do nothing.
pub struct TelemetryStarter {
    client: Mutex<Option<TelemetryClient>>,
}

impl TelemetryStarter {
    pub fn new(client: TelemetryClient) -> Self {
        TelemetryStarter {
            client: Mutex::new(Some(client)),
        }
    }

    pub fn is_started(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl StationUpHandler for TelemetryStarter {
    fn station_up(&self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(client) = client {
            info!("Station up, starting telemetry client");
            tokio::spawn(client.run());
        }
    }
}
