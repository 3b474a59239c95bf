//! Sizes and durations, parsed from flags and rendered for humans

use crate::{CliError, Result};
use std::time::Duration;

/// Parse a byte size such as `512`, `10k`, `1.5GB` or `2GiB`.
///
/// Suffixes are binary multiples (1024) as for memory and storage flags.
pub fn parse_bytes(value: &str) -> Result<u64> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| CliError::invalid_argument(format!("invalid size: '{}'", value)))?;

    let multiplier: u64 = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        "p" | "pb" | "pib" => 1 << 50,
        other => {
            return Err(CliError::invalid_argument(format!(
                "invalid suffix: '{}'",
                other
            )))
        }
    };
    Ok((number * multiplier as f64) as u64)
}

/// Decimal (SI) size with up to four significant digits: `1.5kB`, `155MB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{}{}", significant(value, 4), UNITS[unit])
}

fn significant(value: f64, digits: usize) -> String {
    let whole = if value >= 100.0 {
        3
    } else if value >= 10.0 {
        2
    } else {
        1
    };
    let decimals = digits.saturating_sub(whole);
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Parse a duration such as `10s`, `1h30m` or `2h 5min`.
pub fn parse_duration(value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .map_err(|e| CliError::invalid_argument(format!("invalid duration {:?}: {}", value, e)))
}

/// Approximate elapsed time: `About a minute`, `3 days`, `2 weeks`.
pub fn human_duration(d: Duration) -> String {
    let seconds = d.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    match () {
        _ if seconds < 1 => "Less than a second".to_string(),
        _ if seconds == 1 => "1 second".to_string(),
        _ if seconds < 60 => format!("{} seconds", seconds),
        _ if minutes == 1 => "About a minute".to_string(),
        _ if minutes < 60 => format!("{} minutes", minutes),
        _ if hours == 1 => "About an hour".to_string(),
        _ if hours < 48 => format!("{} hours", hours),
        _ if hours < 24 * 7 * 2 => format!("{} days", days),
        _ if hours < 24 * 30 * 2 => format!("{} weeks", days / 7),
        _ if hours < 24 * 365 * 2 => format!("{} months", days / 30),
        _ => format!("{} years", days / 365),
    }
}

/// Time since a unix timestamp, phrased relative to now
pub fn time_ago(unix_seconds: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let elapsed = Duration::from_secs(now.saturating_sub(unix_seconds).max(0) as u64);
    format!("{} ago", human_duration(elapsed))
}
