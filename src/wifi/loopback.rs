/// Host stand-in for the radio: joins succeed and links come up immediately
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::error::DriverError;
use crate::wifi::driver::{
    AccessPointConfig, Interface, Ipv4Config, LinkEvent, Security, WifiDriver,
};

#[derive(Debug, Default)]
struct LoopbackState {
    joined_ssid: Option<String>,
    hosted_ssid: Option<String>,
    up: HashMap<Interface, bool>,
    observers: HashMap<Interface, mpsc::UnboundedSender<LinkEvent>>,
}

/// Radio driver for running on a host that already has a network
///
/// Any non-empty SSID joins. Bringing an interface up reports link up to
/// its observer right away, which is what the real stack does once DHCP
/// has an address.
#[derive(Debug)]
pub struct LoopbackRadio {
    mac: [u8; 6],
    state: Mutex<LoopbackState>,
}

impl LoopbackRadio {
    pub fn new(mac: [u8; 6]) -> Self {
        LoopbackRadio {
            mac,
            state: Mutex::new(LoopbackState::default()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LoopbackState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    fn notify(state: &LoopbackState, iface: Interface, event: LinkEvent) {
        if let Some(observer) = state.observers.get(&iface) {
            // A dropped observer just means nobody listens anymore
            let _ = observer.send(event);
        }
    }
}

#[async_trait]
impl WifiDriver for LoopbackRadio {
    async fn join(
        &self,
        ssid: &str,
        security: Security,
        _passphrase: &str,
    ) -> Result<(), DriverError> {
        if ssid.is_empty() {
            return Err(DriverError::Rejected("empty ssid".to_string()));
        }
        info!("loopback: joined {} ({:?})", ssid, security);
        self.with_state(|s| s.joined_ssid = Some(ssid.to_string()));
        Ok(())
    }

    async fn leave(&self, iface: Interface) -> Result<(), DriverError> {
        self.with_state(|s| match iface {
            Interface::Station => s.joined_ssid = None,
            Interface::AccessPoint => s.hosted_ssid = None,
        });
        debug!("loopback: left {:?}", iface);
        Ok(())
    }

    async fn start_ap(&self, config: &AccessPointConfig) -> Result<(), DriverError> {
        info!(
            "loopback: hosting {} on channel {} ({:?})",
            config.ssid, config.channel, config.security
        );
        self.with_state(|s| s.hosted_ssid = Some(config.ssid.clone()));
        Ok(())
    }

    async fn add_interface(
        &self,
        iface: Interface,
        address: &Ipv4Config,
    ) -> Result<(), DriverError> {
        debug!(
            "loopback: {:?} bound to {}/{}",
            iface, address.address, address.prefix_len
        );
        self.with_state(|s| {
            s.up.insert(iface, false);
        });
        Ok(())
    }

    async fn set_interface_up(&self, iface: Interface) -> Result<(), DriverError> {
        self.with_state(|s| {
            if iface == Interface::Station && s.joined_ssid.is_none() {
                return Err(DriverError::Other("station not associated".to_string()));
            }
            s.up.insert(iface, true);
            Self::notify(s, iface, LinkEvent::Up);
            Ok(())
        })
    }

    async fn set_interface_down(&self, iface: Interface) -> Result<(), DriverError> {
        self.with_state(|s| {
            s.up.insert(iface, false);
            Self::notify(s, iface, LinkEvent::Down);
        });
        Ok(())
    }

    async fn start_dhcp_client(&self, iface: Interface) -> Result<(), DriverError> {
        debug!("loopback: DHCP client started on {:?}", iface);
        Ok(())
    }

    async fn stop_dhcp_client(&self, iface: Interface) -> Result<(), DriverError> {
        debug!("loopback: DHCP client stopped on {:?}", iface);
        Ok(())
    }

    async fn set_static_address(
        &self,
        iface: Interface,
        address: &Ipv4Config,
    ) -> Result<(), DriverError> {
        debug!(
            "loopback: {:?} static {}/{} via {}",
            iface, address.address, address.prefix_len, address.gateway
        );
        Ok(())
    }

    async fn start_dhcp_server(&self, iface: Interface) -> Result<(), DriverError> {
        debug!("loopback: DHCP server started on {:?}", iface);
        Ok(())
    }

    async fn stop_dhcp_server(&self, iface: Interface) -> Result<(), DriverError> {
        debug!("loopback: DHCP server stopped on {:?}", iface);
        Ok(())
    }

    async fn mac_address(&self) -> Result<[u8; 6], DriverError> {
        Ok(self.mac)
    }

    fn watch_link(&self, iface: Interface, observer: mpsc::UnboundedSender<LinkEvent>) {
        self.with_state(|s| {
            s.observers.insert(iface, observer);
        });
    }
}
