//! Duration parsing for intervals given on the command line or in options.

use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

/// Suffix to milliseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ms", 1.0),
    ("h", 3_600_000.0),
    ("m", 60_000.0),
    ("s", 1_000.0),
];

/// Parse "250", "250ms", "2.5s", "1m" or "1h" into milliseconds.
///
/// A bare number is taken as milliseconds. The result may be zero or
/// negative; callers decide what that means.
pub fn parse_millis(s: &str) -> Result<f64> {
    let s = s.trim();

    let (value, multiplier) = UNITS
        .iter()
        .find_map(|(suffix, multiplier)| s.strip_suffix(suffix).map(|v| (v, *multiplier)))
        .unwrap_or((s, 1.0));

    let value: f64 = value.trim().parse()?;
    let millis = value * multiplier;
    if !millis.is_finite() {
        bail!("Duration out of range: {}", s);
    }
    Ok(millis)
}

/// Parse a strictly positive duration string.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let millis = parse_millis(s)?;
    if millis <= 0.0 {
        bail!("Duration must be positive: {}", s);
    }
    Ok(Duration::from_secs_f64(millis / 1_000.0))
}

/// Read an option value as milliseconds.
///
/// Accepts JSON numbers and strings in any form [`parse_millis`] accepts.
pub fn millis_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_millis(s).ok(),
        _ => None,
    }
}

/// Read an option value as a strictly positive duration.
pub fn duration_from_value(value: &Value) -> Option<Duration> {
    millis_from_value(value)
        .filter(|ms| *ms > 0.0)
        .map(|ms| Duration::from_secs_f64(ms / 1_000.0))
}

/// Format a duration for display
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        if millis % 1_000 == 0 {
            format!("{}s", millis / 1_000)
        } else {
            format!("{:.1}s", d.as_secs_f64())
        }
    } else {
        format!("{}m{:02}s", millis / 60_000, (millis % 60_000) / 1_000)
    }
}
