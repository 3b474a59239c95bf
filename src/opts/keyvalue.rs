//! `key=value` lists: labels, driver options, environment

use crate::{CliError, Result};
use std::collections::BTreeMap;

/// Split `key=value`; the value may be empty, the key may not.
pub fn parse_key_value(value: &str) -> Result<(String, String)> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => Ok((key.trim().to_string(), val.to_string())),
        Some(_) => Err(CliError::invalid_argument(format!(
            "invalid key=value pair {:?}: empty key",
            value
        ))),
        None => Err(CliError::invalid_argument(format!(
            "invalid key=value pair {:?}: missing '='",
            value
        ))),
    }
}

/// Labels accept a bare key, meaning an empty value.
pub fn parse_label(value: &str) -> Result<(String, String)> {
    if value.contains('=') {
        parse_key_value(value)
    } else if value.trim().is_empty() {
        Err(CliError::invalid_argument("invalid label: empty name"))
    } else {
        Ok((value.trim().to_string(), String::new()))
    }
}

/// Collect a repeated flag into a map; later keys override earlier ones.
pub fn to_map<S: AsRef<str>>(
    values: &[S],
    parse: fn(&str) -> Result<(String, String)>,
) -> Result<BTreeMap<String, String>> {
    values
        .iter()
        .map(|v| parse(v.as_ref()))
        .collect::<Result<Vec<_>>>()
        .map(|pairs| pairs.into_iter().collect())
}

/// Environment entries: `KEY=value` passes through, a bare `KEY` takes its
/// value from `lookup` and is dropped when unset.
pub fn expand_env<S: AsRef<str>>(
    values: &[S],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<String>> {
    let mut env = Vec::new();
    for value in values {
        let value = value.as_ref();
        if value.is_empty() || value.starts_with('=') {
            return Err(CliError::invalid_argument(format!(
                "invalid environment variable: {}",
                value
            )));
        }
        if value.contains('=') {
            env.push(value.to_string());
        } else if let Some(v) = lookup(value) {
            env.push(format!("{}={}", value, v));
        }
    }
    Ok(env)
}

/// clap value parser for strict `key=value` flags
pub fn key_value_flag(value: &str) -> std::result::Result<String, String> {
    parse_key_value(value)
        .map(|_| value.to_string())
        .map_err(|e| e.to_string())
}
