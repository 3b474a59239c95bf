//! API version strings (`major.minor`) and their ordering

use std::cmp::Ordering;

/// Version the client speaks when negotiation is skipped or fails
pub const DEFAULT_VERSION: &str = "1.45";

/// Oldest version the client will negotiate down to
pub const MIN_VERSION: &str = "1.24";

/// Environment variable forcing the API version
pub const API_VERSION_ENV: &str = "DOCKER_API_VERSION";

fn components(v: &str) -> Vec<u64> {
    v.trim_start_matches('v')
        .split('.')
        .map(|p| p.parse().unwrap_or(0))
        .collect()
}

/// Numeric comparison; missing components count as zero.
pub fn compare(a: &str, b: &str) -> Ordering {
    let (a, b) = (components(a), components(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn less_than(a: &str, b: &str) -> bool {
    compare(a, b) == Ordering::Less
}

pub fn greater_or_equal(a: &str, b: &str) -> bool {
    compare(a, b) != Ordering::Less
}

/// The version to use against a server advertising `server`.
pub fn negotiate(server: &str) -> String {
    let server = if server.trim().is_empty() {
        MIN_VERSION
    } else {
        server.trim()
    };
    if less_than(server, DEFAULT_VERSION) {
        server.to_string()
    } else {
        DEFAULT_VERSION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare() {
        assert_eq!(compare("1.40", "1.42"), Ordering::Less);
        assert_eq!(compare("1.9", "1.10"), Ordering::Less);
        assert_eq!(compare("1.45", "1.45.0"), Ordering::Equal);
        assert!(greater_or_equal("1.45", "1.24"));
        assert!(less_than("v1.24", "1.25"));
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(negotiate("1.40"), "1.40");
        assert_eq!(negotiate("1.99"), DEFAULT_VERSION);
        assert_eq!(negotiate(""), MIN_VERSION);
    }
}
