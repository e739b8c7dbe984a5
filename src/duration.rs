//! Duration parsing for config values like "250ms", "10s", "5m".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer};

/// Parse a duration string like "250ms", "10s", "5m", "1h".
///
/// Supported units:
/// - `ms` - milliseconds
/// - `s` - seconds
/// - `m` - minutes
/// - `h` - hours
///
/// The input is case-insensitive and whitespace is trimmed.
///
/// # Examples
///
/// ```
/// use mf_snapshot::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(5 * 60));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    // "ms" must be checked before "m" and "s".
    let (num, unit) = if let Some(num) = s.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = s.strip_suffix('h') {
        (num, "h")
    } else if let Some(num) = s.strip_suffix('m') {
        (num, "m")
    } else if let Some(num) = s.strip_suffix('s') {
        (num, "s")
    } else {
        anyhow::bail!("Duration must end with ms, s, m, or h");
    };

    let num: u64 = num.parse().with_context(|| "Invalid number in duration")?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num.checked_mul(60).context("Duration is too large")?),
        "h" => Duration::from_secs(
            num.checked_mul(60 * 60)
                .context("Duration is too large")?,
        ),
        _ => unreachable!(),
    };

    Ok(duration)
}

/// Format a duration using the largest unit that divides it evenly.
///
/// ```
/// use mf_snapshot::duration::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(300)), "5m");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();

    const MILLIS_PER_HOUR: u128 = 60 * 60 * 1000;
    const MILLIS_PER_MINUTE: u128 = 60 * 1000;
    const MILLIS_PER_SECOND: u128 = 1000;

    if millis >= MILLIS_PER_HOUR && millis % MILLIS_PER_HOUR == 0 {
        format!("{}h", millis / MILLIS_PER_HOUR)
    } else if millis >= MILLIS_PER_MINUTE && millis % MILLIS_PER_MINUTE == 0 {
        format!("{}m", millis / MILLIS_PER_MINUTE)
    } else if millis % MILLIS_PER_SECOND == 0 {
        format!("{}s", millis / MILLIS_PER_SECOND)
    } else {
        format!("{millis}ms")
    }
}

/// Serde deserializer for duration strings.
///
/// Use with `#[serde(deserialize_with = "deserialize_duration")]`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(de::Error::custom)
}
