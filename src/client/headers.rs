//! Custom HTTP headers from configuration and `DOCKER_CUSTOM_HEADERS`

use crate::{CliError, Result};
use std::collections::BTreeMap;

/// Environment variable holding extra request headers
pub const CUSTOM_HEADERS_ENV: &str = "DOCKER_CUSTOM_HEADERS";

/// Headers the CLI owns; custom values for these are dropped.
const RESERVED: &[&str] = &["User-Agent"];

/// Canonical MIME form of a header key: `x-meta-data` becomes `X-Meta-Data`.
pub fn canonical_header_key(key: &str) -> String {
    key.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}

fn is_reserved(key: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(key))
}

/// Parse a CSV of `key=value` pairs.
///
/// Keys are trimmed and canonicalised; values are kept verbatim. An empty
/// value removes the key, a later duplicate overrides an earlier one, and
/// reserved headers are ignored.
pub fn parse_custom_headers(value: &str) -> Result<BTreeMap<String, String>> {
    let mut headers = BTreeMap::new();
    if value.trim().is_empty() {
        return Ok(headers);
    }

    let invalid = |detail: String| {
        CliError::invalid_argument(format!(
            "failed to parse custom headers from {} environment variable: {}",
            CUSTOM_HEADERS_ENV, detail
        ))
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(value.as_bytes());

    for record in reader.records() {
        let record = record.map_err(|e| invalid(e.to_string()))?;
        for field in record.iter() {
            if field.trim().is_empty() {
                continue;
            }
            let (key, val) = field.split_once('=').ok_or_else(|| {
                invalid("value must be formatted as comma-separated key=value pairs".to_string())
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(invalid(format!("invalid key in {:?}", field)));
            }
            let key = canonical_header_key(key);
            if is_reserved(&key) {
                tracing::debug!("ignoring custom header {}: reserved", key);
                continue;
            }
            if val.is_empty() {
                headers.remove(&key);
            } else {
                headers.insert(key, val.to_string());
            }
        }
    }
    Ok(headers)
}

/// Effective request headers: config entries, then environment overrides.
/// The user agent is always set last and cannot be replaced.
pub fn effective_headers(
    config: &BTreeMap<String, String>,
    env_value: Option<&str>,
    user_agent: &str,
) -> Result<BTreeMap<String, String>> {
    let mut headers: BTreeMap<String, String> = config
        .iter()
        .map(|(k, v)| (canonical_header_key(k), v.clone()))
        .filter(|(k, _)| !is_reserved(k))
        .collect();

    if let Some(env_value) = env_value {
        for (key, value) in parse_custom_headers(env_value)? {
            headers.insert(key, value);
        }
        // Keys present with an empty value in the env remove config entries.
        for key in removed_keys(env_value) {
            headers.remove(&key);
        }
    }

    headers.insert("User-Agent".to_string(), user_agent.to_string());
    Ok(headers)
}

fn removed_keys(value: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(value.as_bytes());
    let mut last: BTreeMap<String, bool> = BTreeMap::new();
    for record in reader.records().flatten() {
        for field in record.iter() {
            if let Some((key, val)) = field.split_once('=') {
                last.insert(canonical_header_key(key.trim()), val.is_empty());
            }
        }
    }
    last.into_iter()
        .filter_map(|(key, removed)| removed.then_some(key))
        .collect()
}
