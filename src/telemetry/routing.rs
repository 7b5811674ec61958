/// Topic dispatch of inbound payloads into the telemetry store
use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::models::{ForecastSymbol, Reading, MISSING_VALUE};
use crate::store::TelemetryStore;

/// Outdoor weather station feed
pub const TOPIC_OUTDOOR: &str = "sensors/davis";
/// Electricity meter feed
pub const TOPIC_POWER: &str = "sensors/power-meter";
/// Weather forecast feed
pub const TOPIC_FORECAST: &str = "forecast/fmi";
/// Where the locally sensed indoor temperature is published
pub const TOPIC_LOCAL: &str = "sensors/emw-meter";

/// Topics subscribed on every new session
pub const SUBSCRIPTIONS: [&str; 3] = [TOPIC_OUTDOOR, TOPIC_POWER, TOPIC_FORECAST];

const OUTDOOR_PATH: [&str; 3] = ["locations", "outside", "temperature"];
const POWER_PATH: [&str; 1] = ["power"];
const FORECAST_PATH: [&str; 1] = ["weatherSymbol3"];

/// Which store update a message produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Outdoor,
    Power,
    Forecast,
    Ignored,
}

/// Numeric leaf at `path`
///
/// When the leaf is an array the last numeric element is used, which is how
/// the sensor feeds report a series of recent values.
pub fn number_at(doc: &Value, path: &[&str]) -> Option<f64> {
    let leaf = path.iter().try_fold(doc, |node, key| node.get(*key))?;
    match leaf {
        Value::Array(items) => items.iter().rev().find_map(Value::as_f64),
        other => other.as_f64(),
    }
}

/// Parse a payload, turning anything malformed into `Null`
///
/// Every lookup on `Null` misses, so a bad payload degrades to the missing
/// sentinel rather than an error.
pub fn parse_payload(payload: &[u8]) -> Value {
    match serde_json::from_slice(payload) {
        Ok(doc) => doc,
        Err(e) => {
            debug!("Malformed payload ({} bytes): {}", payload.len(), e);
            Value::Null
        }
    }
}

/// Apply one inbound message to the store
///
/// The payload is parsed before the lock is taken; the whole per-topic
/// update then happens under a single lock acquisition.
///
/// # Arguments
/// * `store` - Shared telemetry store
/// * `topic` - Topic the message arrived on
/// * `payload` - Raw message body
///
/// # Returns
/// The route taken, `Route::Ignored` for topics we do not handle
pub fn route_message(store: &TelemetryStore, topic: &str, payload: &[u8]) -> Route {
    let route = match topic {
        TOPIC_POWER => Route::Power,
        TOPIC_FORECAST => Route::Forecast,
        TOPIC_OUTDOOR => Route::Outdoor,
        _ => return Route::Ignored,
    };

    let doc = parse_payload(payload);

    match route {
        Route::Power => {
            let power = Reading::from_option(number_at(&doc, &POWER_PATH));
            store.with_lock(|t| t.record_power(power));
        }
        Route::Forecast => {
            let code = number_at(&doc, &FORECAST_PATH)
                .map(|c| c as i32)
                .unwrap_or(i32::from(MISSING_VALUE));
            let symbol = ForecastSymbol::from_code(code);
            store.with_lock(|t| t.record_forecast(symbol));
        }
        Route::Outdoor => {
            let outdoor = Reading::from_option(number_at(&doc, &OUTDOOR_PATH));
            store.with_lock(|t| t.record_outdoor(outdoor));
        }
        Route::Ignored => {}
    }

    route
}

#[derive(Serialize)]
struct Report {
    locations: ReportLocations,
}

#[derive(Serialize)]
struct ReportLocations {
    inside: ReportSensor,
}

#[derive(Serialize)]
struct ReportSensor {
    temperature: f64,
}

/// JSON body announcing the indoor temperature, `None` when it is missing
pub fn indoor_payload(indoor: Reading) -> Option<String> {
    let value = indoor.value()?;
    let report = Report {
        locations: ReportLocations {
            inside: ReportSensor {
                temperature: (value * 10.0).round() / 10.0,
            },
        },
    };
    serde_json::to_string(&report).ok()
}
