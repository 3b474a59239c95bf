//! `--filter key=value` expressions

use crate::{CliError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Filter arguments sent to the daemon as `{"key":{"value":true}}`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    args: BTreeMap<String, BTreeSet<String>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.args
            .entry(key.into())
            .or_default()
            .insert(value.into());
    }

    /// Values for `key`, sorted
    pub fn get(&self, key: &str) -> Vec<&str> {
        self.args
            .get(key)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.args.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) {
        self.args.remove(key);
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Parse one `--filter` value
    pub fn parse_arg(arg: &str) -> Result<(String, String)> {
        match arg.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_lowercase(), value.to_string()))
            }
            _ => Err(CliError::invalid_argument(format!(
                "bad format of filter (expected name=value): {}",
                arg
            ))),
        }
    }

    /// Build from repeated `--filter` flags
    pub fn from_flags<S: AsRef<str>>(flags: &[S]) -> Result<Self> {
        let mut filters = Self::new();
        for flag in flags {
            let (key, value) = Self::parse_arg(flag.as_ref())?;
            filters.add(key, value);
        }
        Ok(filters)
    }

    /// Reject keys a command does not understand.
    pub fn validate(&self, accepted: &[&str]) -> Result<()> {
        for key in self.args.keys() {
            if !accepted.contains(&key.as_str()) {
                return Err(CliError::invalid_argument(format!("invalid filter '{}'", key)));
            }
        }
        Ok(())
    }

    /// Add every entry of `other` that is not already present.
    pub fn merge_defaults(&mut self, other: &Filters) {
        for (key, values) in &other.args {
            if !self.args.contains_key(key) {
                self.args.insert(key.clone(), values.clone());
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        let map: BTreeMap<&str, BTreeMap<&str, bool>> = self
            .args
            .iter()
            .map(|(k, values)| (k.as_str(), values.iter().map(|v| (v.as_str(), true)).collect()))
            .collect();
        Ok(serde_json::to_string(&map)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.args
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.as_str(), v.as_str())))
    }
}

/// clap value parser for `--filter`
pub fn parse_filter_flag(value: &str) -> std::result::Result<String, String> {
    Filters::parse_arg(value)
        .map(|_| value.to_string())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags_and_json() {
        let filters =
            Filters::from_flags(&["label=a=b", "until=24h", "label=c", "Dangling=true"]).unwrap();
        assert_eq!(filters.get("label"), vec!["a=b", "c"]);
        assert!(filters.contains("dangling"));
        assert_eq!(
            filters.to_json().unwrap(),
            r#"{"dangling":{"true":true},"label":{"a=b":true,"c":true},"until":{"24h":true}}"#
        );
    }

    #[test]
    fn test_bad_format_and_validation() {
        assert!(Filters::from_flags(&["nokey"]).is_err());
        assert!(Filters::from_flags(&["=v"]).is_err());

        let filters = Filters::from_flags(&["name=x", "bogus=1"]).unwrap();
        let err = filters.validate(&["name", "label"]).unwrap_err();
        assert_eq!(err.to_string(), "invalid filter 'bogus'");
    }

    #[test]
    fn test_merge_defaults_keeps_explicit() {
        let mut explicit = Filters::from_flags(&["until=1h"]).unwrap();
        let defaults = Filters::from_flags(&["until=24h", "label=keep"]).unwrap();
        explicit.merge_defaults(&defaults);
        assert_eq!(explicit.get("until"), vec!["1h"]);
        assert_eq!(explicit.get("label"), vec!["keep"]);
    }
}
