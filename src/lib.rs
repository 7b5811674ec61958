//! Connectivity and telemetry core of the EMW3165 room meter
//!
//! The meter joins a configured Wi-Fi network (hosting its own access point
//! when it cannot), keeps an MQTT session to a broker alive, folds the
//! outdoor, power and forecast feeds into a shared store with rolling
//! history, and publishes its own indoor temperature.

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod sensor;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod wifi;

#[cfg(test)]
pub(crate) mod testing;
