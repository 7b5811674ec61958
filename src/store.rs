/// Shared telemetry state guarded by a single lock
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;

use crate::models::{ForecastSymbol, Reading, RollingBuffer};

/// Latest readings and rolling history
///
/// Only reachable through [`TelemetryStore::with_lock`], so every mutation
/// and every read happens under the store lock.
#[derive(Debug, Clone)]
pub struct Telemetry {
    indoor: Reading,
    outdoor: Reading,
    power: Reading,
    forecast: ForecastSymbol,
    indoor_stats: RollingBuffer,
    outdoor_stats: RollingBuffer,
    power_stats: RollingBuffer,
    updated_at: Option<OffsetDateTime>,
}

impl Telemetry {
    fn new() -> Self {
        Telemetry {
            indoor: Reading::MISSING,
            outdoor: Reading::MISSING,
            power: Reading::MISSING,
            forecast: ForecastSymbol::UNKNOWN,
            indoor_stats: RollingBuffer::new(),
            outdoor_stats: RollingBuffer::new(),
            power_stats: RollingBuffer::new(),
            updated_at: None,
        }
    }

    pub fn indoor(&self) -> Reading {
        self.indoor
    }

    pub fn outdoor(&self) -> Reading {
        self.outdoor
    }

    pub fn power(&self) -> Reading {
        self.power
    }

    pub fn forecast(&self) -> ForecastSymbol {
        self.forecast
    }

    pub fn indoor_stats(&self) -> &RollingBuffer {
        &self.indoor_stats
    }

    pub fn outdoor_stats(&self) -> &RollingBuffer {
        &self.outdoor_stats
    }

    pub fn power_stats(&self) -> &RollingBuffer {
        &self.power_stats
    }

    /// Time of the last broker-driven update
    pub fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }

    /// Store a locally sensed indoor temperature (scalar only)
    pub fn set_indoor(&mut self, reading: Reading) {
        self.indoor = reading;
    }

    /// Record a power meter reading: scalar plus one buffer sample
    pub fn record_power(&mut self, reading: Reading) {
        self.power = reading;
        self.power_stats.push(reading.to_whole());
        self.touch();
    }

    /// Record a forecast code and its glyph
    pub fn record_forecast(&mut self, symbol: ForecastSymbol) {
        self.forecast = symbol;
        self.touch();
    }

    /// Record an outdoor temperature
    ///
    /// When an indoor reading is present the indoor buffer advances in the
    /// same step, so both temperature series stay aligned in time.
    pub fn record_outdoor(&mut self, reading: Reading) {
        self.outdoor = reading;
        self.outdoor_stats.push(reading.to_tenths());

        if !self.indoor.is_missing() {
            self.indoor_stats.push(self.indoor.to_tenths());
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(OffsetDateTime::now_utc());
    }
}

/// Process-wide store shared by the telemetry client, the indoor sampler and
/// display consumers
#[derive(Debug)]
pub struct TelemetryStore {
    inner: Mutex<Telemetry>,
}

impl TelemetryStore {
    /// Everything starts out missing, forecast unknown
    pub fn new() -> Self {
        TelemetryStore {
            inner: Mutex::new(Telemetry::new()),
        }
    }

    /// Run `update` with the lock held for its whole duration
    ///
    /// The closure is synchronous, so the lock can never be held across an
    /// await point. A poisoned lock is recovered rather than propagated.
    pub fn with_lock<R>(&self, update: impl FnOnce(&mut Telemetry) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut guard)
    }

    /// Consistent copy of the whole state
    pub fn snapshot(&self) -> Telemetry {
        self.with_lock(|t| t.clone())
    }
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}
