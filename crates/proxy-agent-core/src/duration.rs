//! Human-readable durations for configuration files.
//!
//! Use with `#[serde(with = "proxy_agent_core::duration")]`. Accepts `250ms`,
//! `10s`, `2m`, `1h` or a bare number of seconds.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize as whole seconds, or milliseconds when there is a fraction.
pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    };
    serializer.serialize_str(&s)
}

/// Deserialize from a duration string.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Parse a duration string such as `500ms` or `30s`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let invalid = || format!("invalid duration: {s:?}");

    let (number, scale_ms) = if let Some(n) = s.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60_000)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, 3_600_000)
    } else {
        (s, 1_000)
    };

    let n: u64 = number.trim().parse().map_err(|_| invalid())?;
    n.checked_mul(scale_ms)
        .map(Duration::from_millis)
        .ok_or_else(invalid)
}
