/// Station / access point lifecycle and the background join retry
use log::{error, info, warn};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{station_credentials, ConfigStore};
use crate::error::{ApError, DriverError, JoinError};
use crate::utils::{Sleeper, TokioSleeper};
use crate::wifi::driver::{
    AccessPointConfig, Interface, Ipv4Config, LinkEvent, LogLed, Security, StatusLed, WifiDriver,
};

/// Pause between background join attempts
pub const JOIN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Where the device stands on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Disconnected,
    StationJoining,
    StationUp,
    AccessPointUp,
}

/// Station and access point are tracked independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    /// One of `Disconnected`, `StationJoining`, `StationUp`
    pub station: ConnectivityState,
    /// Join succeeded and has not been torn down
    pub joined: bool,
    pub access_point: bool,
}

impl ConnectivityStatus {
    /// The role currently serving local clients
    pub fn serving(&self) -> ConnectivityState {
        match self.station {
            ConnectivityState::StationUp => ConnectivityState::StationUp,
            _ if self.access_point => ConnectivityState::AccessPointUp,
            other => other,
        }
    }
}

/// Notified whenever the station interface reports link up
pub trait StationUpHandler: Send + Sync {
    fn station_up(&self);
}

/// What `reconcile_at_boot` ended up doing
#[derive(Debug)]
pub enum BootOutcome {
    /// Station join succeeded
    Station,
    /// Join failed; the access point is up and a background task retries
    AccessPointWithRetry(JoinHandle<()>),
    /// No credentials configured; only the access point was started
    AccessPoint,
}

#[derive(Debug)]
struct Radio {
    station: ConnectivityState,
    joined: bool,
    access_point: bool,
    ap_interface_added: bool,
    link_watched: bool,
}

/// Owner of the station and access point interfaces
pub struct ConnectivityManager {
    driver: Arc<dyn WifiDriver>,
    config: Arc<dyn ConfigStore>,
    on_station_up: Arc<dyn StationUpHandler>,
    led: Arc<dyn StatusLed>,
    sleeper: Arc<dyn Sleeper>,
    static_address: Option<Ipv4Config>,
    ap_config: AccessPointConfig,
    radio: Mutex<Radio>,
    link_tx: mpsc::UnboundedSender<LinkEvent>,
    link_rx: Option<mpsc::UnboundedReceiver<LinkEvent>>,
}

impl ConnectivityManager {
    pub fn new(
        driver: Arc<dyn WifiDriver>,
        config: Arc<dyn ConfigStore>,
        on_station_up: Arc<dyn StationUpHandler>,
    ) -> Self {
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        ConnectivityManager {
            driver,
            config,
            on_station_up,
            led: Arc::new(LogLed),
            sleeper: Arc::new(TokioSleeper),
            static_address: None,
            ap_config: AccessPointConfig::default(),
            radio: Mutex::new(Radio {
                station: ConnectivityState::Disconnected,
                joined: false,
                access_point: false,
                ap_interface_added: false,
                link_watched: false,
            }),
            link_tx,
            link_rx: Some(link_rx),
        }
    }

    pub fn with_led(mut self, led: Arc<dyn StatusLed>) -> Self {
        self.led = led;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use a fixed station address instead of DHCP
    pub fn with_static_address(mut self, address: Option<Ipv4Config>) -> Self {
        self.static_address = address;
        self
    }

    /// Share the manager and start watching station link events
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(mut self) -> Arc<Self> {
        let link_rx = self.link_rx.take();
        let manager = Arc::new(self);

        if let Some(link_rx) = link_rx {
            tokio::spawn(watch_station_link(Arc::downgrade(&manager), link_rx));
        }
        manager
    }

    pub async fn status(&self) -> ConnectivityStatus {
        let radio = self.radio.lock().await;
        ConnectivityStatus {
            station: radio.station,
            joined: radio.joined,
            access_point: radio.access_point,
        }
    }

    pub async fn is_joined(&self) -> bool {
        self.radio.lock().await.joined
    }

    /// Join `ssid` and bring the station interface up
    ///
    /// On success the interface is up with DHCP (or the static address)
    /// running; the telemetry client starts once the stack reports link up.
    ///
    /// # Arguments
    /// * `ssid` - Network to join
    /// * `password` - WPA2 passphrase
    ///
    /// # Returns
    /// `JoinError` if already joined or the driver refused any step
    pub async fn start_station(&self, ssid: &str, password: &str) -> Result<(), JoinError> {
        let mut radio = self.radio.lock().await;
        if radio.joined {
            return Err(JoinError::AlreadyJoined);
        }

        radio.station = ConnectivityState::StationJoining;

        if let Err(e) = self.driver.join(ssid, Security::Wpa2MixedPsk, password).await {
            radio.station = ConnectivityState::Disconnected;
            return Err(e.into());
        }
        info!("Join OK.");

        if !radio.link_watched {
            self.driver
                .watch_link(Interface::Station, self.link_tx.clone());
            radio.link_watched = true;
        }

        if let Err(e) = self.configure_station().await {
            // Undo the association so the next attempt starts clean
            if let Err(leave_err) = self.driver.leave(Interface::Station).await {
                warn!("Leaving station network failed: {}", leave_err);
            }
            radio.station = ConnectivityState::Disconnected;
            return Err(e.into());
        }

        radio.joined = true;
        Ok(())
    }

    async fn configure_station(&self) -> Result<(), DriverError> {
        self.driver.set_interface_up(Interface::Station).await?;
        match &self.static_address {
            Some(address) => {
                self.driver
                    .set_static_address(Interface::Station, address)
                    .await
            }
            None => self.driver.start_dhcp_client(Interface::Station).await,
        }
    }

    /// Tear down DHCP, bring the interface down and leave the network
    ///
    /// Does nothing when the station is not joined.
    pub async fn stop_station(&self) {
        let mut radio = self.radio.lock().await;
        if !radio.joined {
            return;
        }

        self.led.set(false);

        if self.static_address.is_none() {
            log_failure(
                "stop DHCP client",
                self.driver.stop_dhcp_client(Interface::Station).await,
            );
        }
        log_failure(
            "station interface down",
            self.driver.set_interface_down(Interface::Station).await,
        );
        log_failure(
            "leave station network",
            self.driver.leave(Interface::Station).await,
        );

        radio.joined = false;
        radio.station = ConnectivityState::Disconnected;
        info!("Left station network");
    }

    /// Host the fixed access point and serve DHCP on it
    ///
    /// The IP interface for the access point is bound on first use only and
    /// reused by every later start.
    pub async fn start_access_point(&self) -> Result<(), ApError> {
        let mut radio = self.radio.lock().await;
        if radio.access_point {
            return Err(ApError::AlreadyRunning);
        }

        info!("Starting Access Point {}.", self.ap_config.ssid);

        if !radio.ap_interface_added {
            self.driver
                .add_interface(Interface::AccessPoint, &self.ap_config.address)
                .await?;
            radio.ap_interface_added = true;
        }

        self.driver.start_ap(&self.ap_config).await?;
        self.driver.set_interface_up(Interface::AccessPoint).await?;
        self.driver.start_dhcp_server(Interface::AccessPoint).await?;

        radio.access_point = true;
        Ok(())
    }

    /// Stop DHCP service and the access point; no-op when not running
    pub async fn stop_access_point(&self) {
        let mut radio = self.radio.lock().await;
        if !radio.access_point {
            return;
        }

        log_failure(
            "stop DHCP server",
            self.driver.stop_dhcp_server(Interface::AccessPoint).await,
        );
        log_failure(
            "access point interface down",
            self.driver.set_interface_down(Interface::AccessPoint).await,
        );
        log_failure(
            "leave access point mode",
            self.driver.leave(Interface::AccessPoint).await,
        );

        radio.access_point = false;
        info!("AP stopped.");
    }

    /// Decide at boot between joining the configured network and hosting
    /// the access point
    pub async fn reconcile_at_boot(self: &Arc<Self>) -> BootOutcome {
        let Some((ssid, password)) = station_credentials(self.config.as_ref()) else {
            info!("No station credentials configured, starting access point");
            self.start_fallback_access_point().await;
            return BootOutcome::AccessPoint;
        };

        info!("Joining {}.", ssid);
        match self.start_station(&ssid, &password).await {
            Ok(()) => BootOutcome::Station,
            Err(e) => {
                warn!("Join failed ({}), retrying join in background.", e);
                self.start_fallback_access_point().await;
                BootOutcome::AccessPointWithRetry(self.spawn_join_retry())
            }
        }
    }

    async fn start_fallback_access_point(&self) {
        if let Err(e) = self.start_access_point().await {
            error!("Cannot start access point: {}", e);
        }
    }

    /// Run `retry_join` on its own task
    pub fn spawn_join_retry(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.retry_join().await })
    }

    /// Keep trying to join until it works or the credentials disappear
    ///
    /// Credentials are re-read after every pause, so changes made through
    /// the configuration take effect on the next attempt.
    pub async fn retry_join(&self) {
        loop {
            self.sleeper.sleep(JOIN_RETRY_INTERVAL).await;

            let Some((ssid, password)) = station_credentials(self.config.as_ref()) else {
                info!("Station credentials cleared");
                break;
            };

            match self.start_station(&ssid, &password).await {
                Ok(()) => {
                    info!("Background join to {} succeeded", ssid);
                    break;
                }
                // Someone else joined meanwhile
                Err(JoinError::AlreadyJoined) => break,
                Err(e) => warn!("Background join failed: {}", e),
            }
        }

        info!("Background join exiting.");
    }

    async fn handle_link_event(&self, event: LinkEvent) {
        let became_up = {
            let mut radio = self.radio.lock().await;
            match event {
                LinkEvent::Up if radio.joined => {
                    radio.station = ConnectivityState::StationUp;
                    true
                }
                LinkEvent::Up => false,
                LinkEvent::Down => {
                    if radio.station == ConnectivityState::StationUp {
                        radio.station = ConnectivityState::StationJoining;
                    }
                    false
                }
            }
        };

        match event {
            LinkEvent::Up if became_up => {
                info!("Station interface up");
                self.led.set(true);
                self.on_station_up.station_up();
            }
            LinkEvent::Up => {}
            LinkEvent::Down => {
                info!("Station interface down");
                self.led.set(false);
            }
        }
    }
}

async fn watch_station_link(
    manager: Weak<ConnectivityManager>,
    mut link_rx: mpsc::UnboundedReceiver<LinkEvent>,
) {
    while let Some(event) = link_rx.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.handle_link_event(event).await;
    }
}

fn log_failure(what: &str, result: Result<(), DriverError>) {
    if let Err(e) = result {
        warn!("Failed to {}: {}", what, e);
    }
}
