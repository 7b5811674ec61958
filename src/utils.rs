/// Utility functions for sleeping, identifiers and formatting
use async_trait::async_trait;
use log::error;
use std::future::Future;
use std::io;
use std::time::Duration;
use time::{format_description, OffsetDateTime};

use crate::models::{ForecastSymbol, RollingBuffer};

/// Suspension point used by every retry loop
///
/// Production code sleeps on the tokio timer; tests substitute a sleeper
/// that records the requested durations and returns immediately.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `tokio::time::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Broker client identifier derived from the station MAC address
///
/// # Arguments
/// * `mac` - Hardware address of the station interface
///
/// # Returns
/// `emw-` followed by the address as 12 lowercase hex digits
pub fn client_id_from_mac(mac: &[u8; 6]) -> String {
    let hex: String = mac.iter().map(|b| format!("{:02x}", b)).collect();
    format!("emw-{}", hex)
}

/// Parse a colon separated MAC address such as `02:00:00:00:00:01`
pub fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');

    for octet in mac.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 {
            return None;
        }
        *octet = u8::from_str_radix(part, 16).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// One-line summary of a rolling buffer for the periodic log
///
/// Temperature buffers hold tenths, so `scale` is 0.1 for them and 1.0 for
/// power. Prints dashes when nothing has been recorded yet.
pub fn describe_buffer(buffer: &RollingBuffer, scale: f64) -> String {
    match buffer.stats() {
        Some(stats) => format!(
            "min {:.1} max {:.1} avg {:.1} ({} samples)",
            f64::from(stats.min) * scale,
            f64::from(stats.max) * scale,
            stats.average * scale,
            stats.samples
        ),
        None => "no samples".to_string(),
    }
}

/// Scalar formatted the way the panel shows it, dashes when missing
pub fn describe_value(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None if decimals == 0 => "----".to_string(),
        None => "--.-".to_string(),
    }
}

/// Forecast code with its weather font glyph
pub fn describe_forecast(symbol: &ForecastSymbol) -> String {
    if symbol.is_known() {
        format!("{} ({})", symbol.code, symbol.glyph)
    } else {
        format!("{} (unknown)", symbol.code)
    }
}

/// Resolve once `signal` fires
///
/// If the signal cannot be installed this never resolves, so the service
/// keeps running instead of shutting down.
pub async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MISSING_VALUE;

    #[test]
    fn client_id_uses_lowercase_hex() {
        let mac = [0x00, 0x1A, 0x2b, 0xFF, 0x01, 0x10];
        assert_eq!(client_id_from_mac(&mac), "emw-001a2bff0110");
    }

    #[test]
    fn mac_parsing() {
        assert_eq!(
            parse_mac("02:00:00:00:00:01"),
            Some([0x02, 0, 0, 0, 0, 0x01])
        );
        assert_eq!(parse_mac("AA:bb:CC:dd:EE:ff"), Some([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]));
        assert_eq!(parse_mac("02:00:00:00:00"), None);
        assert_eq!(parse_mac("02:00:00:00:00:01:02"), None);
        assert_eq!(parse_mac("zz:00:00:00:00:01"), None);
    }

    #[test]
    fn buffer_description() {
        let mut buf = RollingBuffer::new();
        assert_eq!(describe_buffer(&buf, 0.1), "no samples");

        buf.push(200);
        buf.push(MISSING_VALUE);
        buf.push(220);
        assert_eq!(
            describe_buffer(&buf, 0.1),
            "min 20.0 max 22.0 avg 21.0 (2 samples)"
        );
    }

    #[test]
    fn value_description() {
        assert_eq!(describe_value(Some(21.34), 1), "21.3");
        assert_eq!(describe_value(None, 1), "--.-");
        assert_eq!(describe_value(Some(1500.0), 0), "1500");
        assert_eq!(describe_value(None, 0), "----");
    }

    #[test]
    fn forecast_description() {
        assert_eq!(describe_forecast(&ForecastSymbol::from_code(41)), "41 (J)");
        assert_eq!(describe_forecast(&ForecastSymbol::from_code(4)), "4 (unknown)");
    }

    #[tokio::test]
    async fn shutdown_follows_the_signal() {
        let fired = tokio::time::timeout(
            Duration::from_millis(100),
            wait_for_shutdown(async { Ok(()) }),
        )
        .await;
        assert!(fired.is_ok());
    }

    #[tokio::test]
    async fn broken_signal_never_shuts_down() {
        let fired = tokio::time::timeout(
            Duration::from_millis(50),
            wait_for_shutdown(async { Err(io::Error::new(io::ErrorKind::Other, "no handler")) }),
        )
        .await;
        assert!(fired.is_err());
    }
}
