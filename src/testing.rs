//! Fakes for the collaborator traits, shared by unit tests
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::{BrokerAddress, ConfigStore, FileConfigStore};
use crate::error::{DriverError, SessionError};
use crate::telemetry::session::{BrokerConnector, BrokerSession, SessionEvent};
use crate::utils::Sleeper;
use crate::wifi::{
    AccessPointConfig, Interface, Ipv4Config, LinkEvent, Security, StationUpHandler, StatusLed,
    WifiDriver,
};

static CONFIG_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// In-memory configuration with a unique backing path that is never written
/// unless a test calls `save`
pub(crate) fn memory_config(pairs: &[(&str, &str)]) -> Arc<FileConfigStore> {
    let n = CONFIG_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir().join(format!(
        "emw-meter-unit-{}-{}.json",
        std::process::id(),
        n
    ));
    let store = FileConfigStore::new(path);
    for (key, value) in pairs {
        store.set(key, value);
    }
    Arc::new(store)
}

/// Records requested sleeps and returns right away
#[derive(Default)]
pub(crate) struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub(crate) fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Sleeper that runs a hook on every sleep, e.g. to change config between
/// retry attempts
pub(crate) struct HookSleeper<F: Fn(usize) + Send + Sync> {
    calls: AtomicUsize,
    hook: F,
}

impl<F: Fn(usize) + Send + Sync> HookSleeper<F> {
    pub(crate) fn new(hook: F) -> Self {
        HookSleeper {
            calls: AtomicUsize::new(0),
            hook,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<F: Fn(usize) + Send + Sync> Sleeper for HookSleeper<F> {
    async fn sleep(&self, _duration: Duration) {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.hook)(n);
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DriverCall {
    Join(String),
    Leave(Interface),
    StartAp(String),
    AddInterface(Interface),
    Up(Interface),
    Down(Interface),
    DhcpClientStart,
    DhcpClientStop,
    StaticAddress,
    DhcpServerStart,
    DhcpServerStop,
}

/// Driver that fails the first `join_failures` joins and records every call
pub(crate) struct RecordingDriver {
    join_failures: AtomicUsize,
    calls: Mutex<Vec<DriverCall>>,
    observer: Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>,
}

impl RecordingDriver {
    pub(crate) fn new(join_failures: usize) -> Self {
        RecordingDriver {
            join_failures: AtomicUsize::new(join_failures),
            calls: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
        }
    }

    pub(crate) fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &DriverCall) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub(crate) fn joins(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Join(_)))
            .count()
    }

    fn record(&self, call: DriverCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn notify(&self, event: LinkEvent) {
        if let Some(observer) = self.observer.lock().unwrap().as_ref() {
            let _ = observer.send(event);
        }
    }
}

#[async_trait]
impl WifiDriver for RecordingDriver {
    async fn join(&self, ssid: &str, _: Security, _: &str) -> Result<(), DriverError> {
        self.record(DriverCall::Join(ssid.to_string()));
        let remaining = self.join_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.join_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DriverError::Rejected(format!("{} not found", ssid)));
        }
        Ok(())
    }

    async fn leave(&self, iface: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::Leave(iface));
        Ok(())
    }

    async fn start_ap(&self, config: &AccessPointConfig) -> Result<(), DriverError> {
        self.record(DriverCall::StartAp(config.ssid.clone()));
        Ok(())
    }

    async fn add_interface(&self, iface: Interface, _: &Ipv4Config) -> Result<(), DriverError> {
        self.record(DriverCall::AddInterface(iface));
        Ok(())
    }

    async fn set_interface_up(&self, iface: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::Up(iface));
        if iface == Interface::Station {
            self.notify(LinkEvent::Up);
        }
        Ok(())
    }

    async fn set_interface_down(&self, iface: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::Down(iface));
        if iface == Interface::Station {
            self.notify(LinkEvent::Down);
        }
        Ok(())
    }

    async fn start_dhcp_client(&self, _: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::DhcpClientStart);
        Ok(())
    }

    async fn stop_dhcp_client(&self, _: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::DhcpClientStop);
        Ok(())
    }

    async fn set_static_address(&self, _: Interface, _: &Ipv4Config) -> Result<(), DriverError> {
        self.record(DriverCall::StaticAddress);
        Ok(())
    }

    async fn start_dhcp_server(&self, _: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::DhcpServerStart);
        Ok(())
    }

    async fn stop_dhcp_server(&self, _: Interface) -> Result<(), DriverError> {
        self.record(DriverCall::DhcpServerStop);
        Ok(())
    }

    async fn mac_address(&self) -> Result<[u8; 6], DriverError> {
        Ok([0x02, 0, 0, 0, 0, 0x01])
    }

    fn watch_link(&self, _: Interface, observer: mpsc::UnboundedSender<LinkEvent>) {
        *self.observer.lock().unwrap() = Some(observer);
    }
}

/// Counts station-up notifications
#[derive(Default)]
pub(crate) struct CountingHandler {
    count: AtomicUsize,
}

impl CountingHandler {
    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl StationUpHandler for CountingHandler {
    fn station_up(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Remembers the last LED state
#[derive(Default)]
pub(crate) struct RecordingLed {
    states: Mutex<Vec<bool>>,
}

impl RecordingLed {
    pub(crate) fn last(&self) -> Option<bool> {
        self.states.lock().unwrap().last().copied()
    }
}

impl StatusLed for RecordingLed {
    fn set(&self, on: bool) {
        self.states.lock().unwrap().push(on);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionCall {
    Subscribe(String),
    Publish(String, String),
    Ping,
    Disconnect,
}

/// Events a scripted session hands out, in order, plus the calls that fail
#[derive(Default)]
pub(crate) struct SessionScript {
    events: VecDeque<Result<SessionEvent, SessionError>>,
    subscribe_error: Option<SessionError>,
    publish_error: Option<SessionError>,
    ping_error: Option<SessionError>,
}

impl SessionScript {
    pub(crate) fn new(events: Vec<Result<SessionEvent, SessionError>>) -> Self {
        SessionScript {
            events: events.into(),
            ..Default::default()
        }
    }

    pub(crate) fn failing_subscribe(mut self, error: SessionError) -> Self {
        self.subscribe_error = Some(error);
        self
    }

    pub(crate) fn failing_publish(mut self, error: SessionError) -> Self {
        self.publish_error = Some(error);
        self
    }

    pub(crate) fn failing_ping(mut self, error: SessionError) -> Self {
        self.ping_error = Some(error);
        self
    }
}

struct ScriptedSession {
    script: SessionScript,
    calls: Arc<Mutex<Vec<SessionCall>>>,
}

/// Failures are recorded like successful calls
fn outcome(error: &Option<SessionError>) -> Result<(), SessionError> {
    match error {
        Some(e) => Err(e.clone()),
        None => Ok(()),
    }
}

#[async_trait]
impl BrokerSession for ScriptedSession {
    async fn subscribe(&mut self, topic: &str) -> Result<(), SessionError> {
        self.calls
            .lock()
            .unwrap()
            .push(SessionCall::Subscribe(topic.to_string()));
        outcome(&self.script.subscribe_error)
    }

    async fn next_event(&mut self) -> Result<SessionEvent, SessionError> {
        self.script
            .events
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::ConnectionLost("script exhausted".into())))
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SessionError> {
        self.calls.lock().unwrap().push(SessionCall::Publish(
            topic.to_string(),
            String::from_utf8_lossy(payload).into_owned(),
        ));
        outcome(&self.script.publish_error)
    }

    async fn ping(&mut self) -> Result<(), SessionError> {
        self.calls.lock().unwrap().push(SessionCall::Ping);
        outcome(&self.script.ping_error)
    }

    async fn disconnect(&mut self) {
        self.calls.lock().unwrap().push(SessionCall::Disconnect);
    }
}

/// Hands out one scripted session (or connect error) per connect call
pub(crate) struct ScriptedConnector {
    scripts: Mutex<VecDeque<Result<SessionScript, SessionError>>>,
    addresses: Mutex<Vec<BrokerAddress>>,
    client_ids: Mutex<Vec<String>>,
    sessions: Mutex<Vec<Arc<Mutex<Vec<SessionCall>>>>>,
}

impl ScriptedConnector {
    pub(crate) fn new(scripts: Vec<Result<SessionScript, SessionError>>) -> Self {
        ScriptedConnector {
            scripts: Mutex::new(scripts.into()),
            addresses: Mutex::new(Vec::new()),
            client_ids: Mutex::new(Vec::new()),
            sessions: Mutex::new(Vec::new()),
        }
    }

    /// Calls made on the `n`th successfully opened session
    pub(crate) fn calls(&self, n: usize) -> Vec<SessionCall> {
        self.sessions.lock().unwrap()[n].lock().unwrap().clone()
    }

    pub(crate) fn addresses(&self) -> Vec<BrokerAddress> {
        self.addresses.lock().unwrap().clone()
    }

    pub(crate) fn client_ids(&self) -> Vec<String> {
        self.client_ids.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerConnector for ScriptedConnector {
    async fn connect(
        &self,
        address: &BrokerAddress,
        client_id: &str,
    ) -> Result<Box<dyn BrokerSession>, SessionError> {
        self.addresses.lock().unwrap().push(address.clone());
        self.client_ids.lock().unwrap().push(client_id.to_string());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::Connect("no script left".into())))?;

        let calls = Arc::new(Mutex::new(Vec::new()));
        self.sessions.lock().unwrap().push(Arc::clone(&calls));
        Ok(Box::new(ScriptedSession {
            script,
            calls,
        }))
    }
}
