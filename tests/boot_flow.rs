use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use emw_meter::config::{
    BrokerAddress, ConfigStore, FileConfigStore, KEY_BROKER, KEY_PASSWORD, KEY_SSID,
};
use emw_meter::error::SessionError;
use emw_meter::store::TelemetryStore;
use emw_meter::telemetry::{
    BrokerConnector, BrokerSession, InboundMessage, SessionEvent, TelemetryClient,
    TelemetryStarter, TOPIC_OUTDOOR,
};
use emw_meter::utils::Sleeper;
use emw_meter::wifi::{BootOutcome, ConnectivityManager, ConnectivityState, LoopbackRadio};

/// Parks forever, so the client stays inside its first back-off
struct ParkingSleeper;

#[async_trait]
impl Sleeper for ParkingSleeper {
    async fn sleep(&self, _duration: Duration) {
        std::future::pending::<()>().await;
    }
}

struct OneShotSession {
    events: VecDeque<SessionEvent>,
}

#[async_trait]
impl BrokerSession for OneShotSession {
    async fn subscribe(&mut self, _topic: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn next_event(&mut self) -> Result<SessionEvent, SessionError> {
        self.events
            .pop_front()
            .ok_or_else(|| SessionError::ConnectionLost("closed".to_string()))
    }

    async fn publish(&mut self, _topic: &str, _payload: &[u8]) -> Result<(), SessionError> {
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn disconnect(&mut self) {}
}

#[derive(Default)]
struct CountingConnector {
    connects: AtomicUsize,
    addresses: Mutex<Vec<String>>,
}

#[async_trait]
impl BrokerConnector for CountingConnector {
    async fn connect(
        &self,
        address: &BrokerAddress,
        _client_id: &str,
    ) -> Result<Box<dyn BrokerSession>, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.addresses.lock().unwrap().push(address.to_string());

        let outdoor = SessionEvent::Publish(InboundMessage {
            topic: TOPIC_OUTDOOR.to_string(),
            payload: br#"{"locations":{"outside":{"temperature":21.3}}}"#.to_vec(),
        });
        Ok(Box::new(OneShotSession {
            events: VecDeque::from(vec![SessionEvent::Other, outdoor]),
        }))
    }
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn config_with_credentials() -> Arc<FileConfigStore> {
    let path = std::env::temp_dir().join(format!("emw-meter-boot-{}.json", std::process::id()));
    let config = FileConfigStore::new(path);
    config.set(KEY_SSID, "home");
    config.set(KEY_PASSWORD, "secret");
    config.set(KEY_BROKER, "broker.local");
    Arc::new(config)
}

#[tokio::test]
async fn boot_joins_station_and_telemetry_reaches_store() {
    // Arrange
    let config = config_with_credentials();
    let store = Arc::new(TelemetryStore::new());
    let connector = Arc::new(CountingConnector::default());

    let client = TelemetryClient::new(
        Arc::clone(&store),
        config.clone(),
        connector.clone(),
        "emw-020000000001",
    )
    .with_sleeper(Arc::new(ParkingSleeper));
    let starter = Arc::new(TelemetryStarter::new(client));

    let manager = ConnectivityManager::new(
        Arc::new(LoopbackRadio::new([2, 0, 0, 0, 0, 1])),
        config.clone(),
        starter.clone(),
    )
    .start();

    // Act
    let outcome = manager.reconcile_at_boot().await;

    // Assert
    assert!(matches!(outcome, BootOutcome::Station));
    eventually("outdoor reading", || {
        store.snapshot().outdoor_stats().tail() == 213
    })
    .await;

    assert!(starter.is_started());
    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(
        *connector.addresses.lock().unwrap(),
        vec!["broker.local:1883".to_string()]
    );
    assert_eq!(
        manager.status().await.station,
        ConnectivityState::StationUp
    );
}

#[tokio::test]
async fn second_link_up_does_not_start_another_client() {
    let config = config_with_credentials();
    let store = Arc::new(TelemetryStore::new());
    let connector = Arc::new(CountingConnector::default());
    let client = TelemetryClient::new(
        Arc::clone(&store),
        config.clone(),
        connector.clone(),
        "emw-020000000001",
    )
    .with_sleeper(Arc::new(ParkingSleeper));
    let starter = Arc::new(TelemetryStarter::new(client));
    let manager = ConnectivityManager::new(
        Arc::new(LoopbackRadio::new([2, 0, 0, 0, 0, 1])),
        config.clone(),
        starter.clone(),
    )
    .start();

    manager.start_station("home", "secret").await.unwrap();
    eventually("first connect", || {
        connector.connects.load(Ordering::SeqCst) == 1
    })
    .await;

    manager.stop_station().await;
    manager.start_station("home", "secret").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.status().await.station,
        ConnectivityState::StationUp
    );
}
