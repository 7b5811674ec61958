use log::{debug, info};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use url::Url;

use crate::error::{ConfigError, SessionError};
use crate::utils::parse_mac;
use crate::wifi::Ipv4Config;

/// Station network name
pub const KEY_SSID: &str = "ap";
/// Station network password
pub const KEY_PASSWORD: &str = "pass";
/// Broker address, `host`, `host:port` or `mqtt://host:port`
pub const KEY_BROKER: &str = "mqtt.server";

const DEFAULT_CONFIG_PATH: &str = "emw-meter.json";
const DEFAULT_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 15;
const DEFAULT_BROKER_PORT: u16 = 1883;

/// Process settings read from the environment (and `.env`)
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub config_path: PathBuf,
    pub mac: [u8; 6],
    pub onewire_device: Option<PathBuf>,
    pub sample_interval: Duration,
    pub static_ip: Option<Ipv4Config>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup, environment or otherwise
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config_path = lookup("EMW_CONFIG_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mac = match lookup("EMW_MAC") {
            Some(text) => parse_mac(&text).ok_or(ConfigError::InvalidSetting {
                key: "EMW_MAC",
                value: text,
            })?,
            None => DEFAULT_MAC,
        };

        let onewire_device = lookup("EMW_ONEWIRE_DEVICE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let sample_interval = match lookup("EMW_SAMPLE_INTERVAL_SECS") {
            Some(text) => match text.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidSetting {
                        key: "EMW_SAMPLE_INTERVAL_SECS",
                        value: text,
                    })
                }
            },
            None => Duration::from_secs(DEFAULT_SAMPLE_INTERVAL_SECS),
        };

        let static_ip = match lookup("EMW_STATIC_IP") {
            Some(text) => Some(parse_static_ip(&text).ok_or(ConfigError::InvalidSetting {
                key: "EMW_STATIC_IP",
                value: text,
            })?),
            None => None,
        };

        debug!(
            "Settings: config={}, onewire={:?}, sample every {:?}",
            config_path.display(),
            onewire_device,
            sample_interval
        );

        Ok(Settings {
            config_path,
            mac,
            onewire_device,
            sample_interval,
            static_ip,
        })
    }
}

/// Parse `address/prefix@gateway`, e.g. `192.168.61.55/24@192.168.61.1`
fn parse_static_ip(text: &str) -> Option<Ipv4Config> {
    let (cidr, gateway) = text.trim().split_once('@')?;
    let (address, prefix) = cidr.split_once('/')?;

    let prefix_len: u8 = prefix.parse().ok()?;
    if prefix_len > 32 {
        return None;
    }

    Some(Ipv4Config {
        address: address.parse().ok()?,
        prefix_len,
        gateway: gateway.parse().ok()?,
    })
}

/// Persistent key/value configuration
///
/// Values changed with `set` live in memory until `save` writes them out.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn save(&self) -> Result<(), ConfigError>;
    fn load(&self) -> Result<(), ConfigError>;
    /// Remove the persisted copy; in-memory values stay until restart
    fn clear(&self) -> Result<(), ConfigError>;
}

/// Station SSID and password, when both are set and non-empty
pub fn station_credentials(config: &dyn ConfigStore) -> Option<(String, String)> {
    let ssid = config.get(KEY_SSID).filter(|s| !s.is_empty())?;
    let password = config.get(KEY_PASSWORD).filter(|p| !p.is_empty())?;
    Some((ssid, password))
}

/// Configuration kept in a flat JSON object on disk
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileConfigStore {
    /// Create an empty store backed by `path`; nothing is read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileConfigStore {
            path: path.into(),
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a store and load whatever is persisted at `path`
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
    }

    fn save(&self) -> Result<(), ConfigError> {
        let text = {
            let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*values)?
        };
        fs::write(&self.path, text)?;
        info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<(), ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No configuration at {}, starting empty",
                    self.path.display()
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let loaded: BTreeMap<String, String> = serde_json::from_str(&text)?;
        info!(
            "Loaded {} configuration entries from {}",
            loaded.len(),
            self.path.display()
        );

        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        *values = loaded;
        Ok(())
    }

    fn clear(&self) -> Result<(), ConfigError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Broker host and port parsed from the `mqtt.server` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Accepts `host`, `host:port` and `mqtt://host[:port]`
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let text = text.trim();
        let invalid = || SessionError::InvalidAddress(text.to_string());

        if text.is_empty() {
            return Err(invalid());
        }

        let with_scheme = if text.contains("://") {
            text.to_string()
        } else {
            format!("mqtt://{}", text)
        };

        let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
        if !matches!(url.scheme(), "mqtt" | "tcp") {
            return Err(invalid());
        }

        let host = match url.host() {
            Some(url::Host::Domain(d)) if !d.is_empty() => d.to_string(),
            Some(url::Host::Ipv4(ip)) => ip.to_string(),
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            _ => return Err(invalid()),
        };

        Ok(BrokerAddress {
            host,
            port: url.port().unwrap_or(DEFAULT_BROKER_PORT),
        })
    }
}

impl std::fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
