/// Indoor temperature sensing
use log::{debug, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::models::Reading;
use crate::store::TelemetryStore;
use crate::utils::Sleeper;

/// DS18B20 reports exactly this after a power-on reset, before any conversion
const POWER_ON_RESET_CELSIUS: f64 = 85.0;

/// Source of the indoor temperature
pub trait TemperatureSensor: Send + Sync {
    /// Current reading, `Reading::MISSING` when the sensor cannot be read
    fn read(&self) -> Reading;
}

/// DS18B20 exposed by the Linux w1-therm driver
///
/// Reads the `temperature` attribute (millidegrees Celsius) under the
/// device directory, e.g. `/sys/bus/w1/devices/28-000005e2fdc3`.
#[derive(Debug, Clone)]
pub struct W1Thermometer {
    device: PathBuf,
}

impl W1Thermometer {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        W1Thermometer {
            device: device.into(),
        }
    }
}

impl TemperatureSensor for W1Thermometer {
    fn read(&self) -> Reading {
        let path = self.device.join("temperature");
        match fs::read_to_string(&path) {
            Ok(text) => parse_millidegrees(&text).unwrap_or_else(|| {
                warn!("Unusable reading '{}' from {}", text.trim(), path.display());
                Reading::MISSING
            }),
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                Reading::MISSING
            }
        }
    }
}

fn parse_millidegrees(text: &str) -> Option<Reading> {
    let millis: i64 = text.trim().parse().ok()?;
    let celsius = millis as f64 / 1000.0;
    if celsius >= POWER_ON_RESET_CELSIUS {
        return None;
    }
    Some(Reading::new(celsius))
}

/// Store one fresh indoor reading
///
/// The read itself runs on the blocking pool; a w1 conversion can take most
/// of a second.
pub async fn sample_indoor(store: &TelemetryStore, sensor: Arc<dyn TemperatureSensor>) -> Reading {
    let reading = tokio::task::spawn_blocking(move || sensor.read())
        .await
        .unwrap_or(Reading::MISSING);

    store.with_lock(|t| t.set_indoor(reading));
    debug!("Indoor temperature {:?}", reading.value());
    reading
}

/// Sample the indoor sensor forever, `interval` apart
pub async fn run_indoor_sampler(
    store: Arc<TelemetryStore>,
    sensor: Arc<dyn TemperatureSensor>,
    sleeper: Arc<dyn Sleeper>,
    interval: Duration,
) {
    loop {
        sample_indoor(&store, Arc::clone(&sensor)).await;
        sleeper.sleep(interval).await;
    }
}
