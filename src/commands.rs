/// Operator commands behind the device shell
///
/// Each command returns the status lines to print; tokenizing the command
/// line is the shell's business.
use log::info;
use std::sync::Arc;

use crate::config::{BrokerAddress, ConfigStore, KEY_BROKER, KEY_PASSWORD, KEY_SSID};
use crate::error::{ApError, JoinError};
use crate::wifi::ConnectivityManager;

pub struct Commands {
    manager: Arc<ConnectivityManager>,
    config: Arc<dyn ConfigStore>,
}

impl Commands {
    pub fn new(manager: Arc<ConnectivityManager>, config: Arc<dyn ConfigStore>) -> Self {
        Commands { manager, config }
    }

    /// `ap` / `ap --stop`
    pub async fn access_point(&self, stop: bool) -> Vec<String> {
        if stop {
            self.manager.stop_access_point().await;
            return lines(&["AP stopped."]);
        }

        match self.manager.start_access_point().await {
            Ok(()) => lines(&["Starting Access Point."]),
            Err(ApError::AlreadyRunning) => lines(&["AP already running."]),
            Err(e) => {
                info!("ap command: {}", e);
                lines(&["Cannot start AP."])
            }
        }
    }

    /// `sta <ssid> <pass>`: remember the credentials and join right away
    pub async fn join_station(&self, ssid: &str, password: &str) -> Vec<String> {
        if self.manager.is_joined().await {
            return lines(&["Already joined Wifi network."]);
        }

        self.config.set(KEY_SSID, ssid);
        self.config.set(KEY_PASSWORD, password);

        let mut out = vec![format!("Joining {}.", ssid)];
        match self.manager.start_station(ssid, password).await {
            Ok(()) => out.push("Join OK.".to_string()),
            Err(JoinError::AlreadyJoined) => out.push("Already joined Wifi network.".to_string()),
            Err(e) => {
                info!("sta command: {}", e);
                out.push("Join failed.".to_string());
            }
        }
        out
    }

    /// `sta --reset`: leave the network and forget the credentials
    pub async fn reset_station(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.manager.is_joined().await {
            self.manager.stop_station().await;
            out.push("Left ap.".to_string());
        }

        self.config.set(KEY_SSID, "");
        self.config.set(KEY_PASSWORD, "");
        out.push("Station credentials cleared.".to_string());
        out
    }

    /// `mqtt <server>`; used from the next connection attempt on
    pub fn set_broker(&self, server: &str) -> Vec<String> {
        match BrokerAddress::parse(server) {
            Ok(address) => {
                self.config.set(KEY_BROKER, server.trim());
                vec![format!("Broker set to {}.", address)]
            }
            Err(_) => vec![format!("Invalid broker address '{}'.", server.trim())],
        }
    }

    /// `wr`
    pub fn save(&self) -> Vec<String> {
        match self.config.save() {
            Ok(()) => lines(&["Settings saved."]),
            Err(e) => vec![format!("Cannot save settings: {}.", e)],
        }
    }

    /// `clear`
    pub fn clear(&self) -> Vec<String> {
        match self.config.clear() {
            Ok(()) => lines(&["Saved settings cleared."]),
            Err(e) => vec![format!("Cannot clear settings: {}.", e)],
        }
    }
}

fn lines(text: &[&str]) -> Vec<String> {
    text.iter().map(|s| s.to_string()).collect()
}
