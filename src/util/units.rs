//! Duration formatting and parsing utilities
//!
//! Configuration durations are written as humantime strings ("30s", "5ms",
//! "1m 30s"); these helpers convert in both directions.

use std::time::Duration;

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use dlbench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(5)), "5ms");
/// ```
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    humantime::format_duration(duration).to_string()
}

/// Parse duration string into Duration
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use dlbench::util::units::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(input).map_err(|e| format!("Invalid duration \"{}\": {}", input, e))
}

/// Format transactions per second with appropriate units
///
/// # Examples
/// ```
/// use dlbench::util::units::format_tps;
///
/// assert_eq!(format_tps(1500), "1.5K TPS");
/// assert_eq!(format_tps(42), "42 TPS");
/// ```
pub fn format_tps(tps: u64) -> String {
    if tps >= 1_000_000 {
        format!("{:.1}M TPS", tps as f64 / 1_000_000.0)
    } else if tps >= 1_000 {
        format!("{:.1}K TPS", tps as f64 / 1_000.0)
    } else {
        format!("{} TPS", tps)
    }
}

/// Serde adapter storing a `Duration` as a humantime string
pub mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(de::Error::custom)
    }
}
