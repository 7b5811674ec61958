/// Interfaces of the wireless radio and network stack the manager drives
use async_trait::async_trait;
use log::info;
use std::net::Ipv4Addr;
use tokio::sync::mpsc;

use crate::error::DriverError;

/// The two independent hardware interfaces of the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Station,
    AccessPoint,
}

/// Link security used when joining or hosting a network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Wpa2AesPsk,
    Wpa2MixedPsk,
}

/// Static IPv4 addressing of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Config {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    pub gateway: Ipv4Addr,
}

/// Link status transition reported by the network stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up,
    Down,
}

/// Fixed parameters of the fallback access point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointConfig {
    pub ssid: String,
    pub security: Security,
    pub passphrase: String,
    pub channel: u8,
    pub address: Ipv4Config,
}

impl Default for AccessPointConfig {
    fn default() -> Self {
        AccessPointConfig {
            ssid: "EMW3165".to_string(),
            security: Security::Wpa2AesPsk,
            passphrase: "xxx123!!!".to_string(),
            channel: 1,
            address: Ipv4Config {
                address: Ipv4Addr::new(192, 168, 0, 1),
                prefix_len: 24,
                gateway: Ipv4Addr::new(192, 168, 0, 1),
            },
        }
    }
}

/// Radio driver plus the parts of the IP stack bound to its interfaces
///
/// Operations mirror what the firmware exposes: join/leave, access point
/// mode, interface up/down, DHCP client and server, and a link status
/// observer per interface.
#[async_trait]
pub trait WifiDriver: Send + Sync {
    /// Associate the station interface with a network
    async fn join(&self, ssid: &str, security: Security, passphrase: &str)
        -> Result<(), DriverError>;

    /// Leave the network (station) or stop hosting it (access point)
    async fn leave(&self, iface: Interface) -> Result<(), DriverError>;

    /// Put the radio's second interface into access point mode
    async fn start_ap(&self, config: &AccessPointConfig) -> Result<(), DriverError>;

    /// Bind an IP interface to the radio interface
    async fn add_interface(&self, iface: Interface, address: &Ipv4Config)
        -> Result<(), DriverError>;

    async fn set_interface_up(&self, iface: Interface) -> Result<(), DriverError>;

    async fn set_interface_down(&self, iface: Interface) -> Result<(), DriverError>;

    async fn start_dhcp_client(&self, iface: Interface) -> Result<(), DriverError>;

    async fn stop_dhcp_client(&self, iface: Interface) -> Result<(), DriverError>;

    async fn set_static_address(&self, iface: Interface, address: &Ipv4Config)
        -> Result<(), DriverError>;

    async fn start_dhcp_server(&self, iface: Interface) -> Result<(), DriverError>;

    async fn stop_dhcp_server(&self, iface: Interface) -> Result<(), DriverError>;

    /// Hardware address of the station interface
    async fn mac_address(&self) -> Result<[u8; 6], DriverError>;

    /// Deliver link status transitions of `iface` to `observer`
    ///
    /// A later registration for the same interface replaces the earlier one.
    fn watch_link(&self, iface: Interface, observer: mpsc::UnboundedSender<LinkEvent>);
}

/// Visual indicator of the station link
pub trait StatusLed: Send + Sync {
    fn set(&self, on: bool);
}

/// Indicator that only logs, for hosts without an LED
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLed;

impl StatusLed for LogLed {
    fn set(&self, on: bool) {
        info!("Wifi LED {}", if on { "on" } else { "off" });
    }
}
