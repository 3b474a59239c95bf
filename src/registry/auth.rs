//! Registry auth entries and the `X-Registry-Auth` encoding

use crate::{CliError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Key under which credentials for the official index are stored
pub const INDEX_SERVER: &str = "https://index.docker.io/v1/";

/// Hostname of the official index
pub const INDEX_HOSTNAME: &str = "index.docker.io";

/// Registry domain used by references without an explicit registry
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Credentials for one registry.
///
/// After a successful interactive login exactly one of `password` or
/// `identity_token` is populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    #[serde(rename = "serveraddress", default, skip_serializing_if = "String::is_empty")]
    pub server_address: String,

    #[serde(rename = "identitytoken", default, skip_serializing_if = "String::is_empty")]
    pub identity_token: String,

    #[serde(rename = "registrytoken", default, skip_serializing_if = "String::is_empty")]
    pub registry_token: String,
}

impl AuthConfig {
    /// True when no credential material is present
    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
            && self.password.is_empty()
            && self.identity_token.is_empty()
            && self.registry_token.is_empty()
    }

    /// Encode as the value of the `X-Registry-Auth` header: base64-URL of the
    /// JSON body.
    pub fn encode_header(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::URL_SAFE.encode(json))
    }

    /// Decode an `X-Registry-Auth` header value
    pub fn decode_header(value: &str) -> Result<Self> {
        let json = base64::engine::general_purpose::URL_SAFE
            .decode(value.trim())
            .map_err(|e| CliError::invalid_argument(format!("invalid X-Registry-Auth header: {}", e)))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Registry index a reference or login target resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub official: bool,
}

impl IndexInfo {
    /// Index info for a registry hostname or server address
    pub fn new(server: &str) -> Self {
        let hostname = convert_to_hostname(server);
        let official = hostname.is_empty()
            || hostname == DEFAULT_REGISTRY
            || hostname == INDEX_HOSTNAME
            || hostname == "registry-1.docker.io";
        Self {
            name: if official {
                DEFAULT_REGISTRY.to_string()
            } else {
                hostname
            },
            official,
        }
    }

    /// The official index
    pub fn official() -> Self {
        Self::new(DEFAULT_REGISTRY)
    }

    /// Key under which credentials for this index are stored
    pub fn auth_key(&self) -> String {
        if self.official {
            INDEX_SERVER.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Canonical hostname of a registry address: scheme and path stripped.
pub fn convert_to_hostname(url: &str) -> String {
    let stripped = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .unwrap_or(url);
    stripped.split('/').next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip_uses_url_alphabet() {
        let auth = AuthConfig {
            username: "user".into(),
            password: "p?>?>?>".into(),
            server_address: "registry.example.com".into(),
            ..Default::default()
        };
        let header = auth.encode_header().unwrap();
        assert!(!header.contains('+') && !header.contains('/'));
        assert_eq!(AuthConfig::decode_header(&header).unwrap(), auth);
    }

    #[test]
    fn test_empty_fields_are_omitted() {
        let auth = AuthConfig {
            identity_token: "tok".into(),
            server_address: "r".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&auth).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["identitytoken"], "tok");
    }

    #[test]
    fn test_index_resolution() {
        assert!(IndexInfo::new("https://index.docker.io/v1/").official);
        assert_eq!(IndexInfo::official().auth_key(), INDEX_SERVER);

        let private = IndexInfo::new("https://registry.example.com:5000/v2/");
        assert!(!private.official);
        assert_eq!(private.auth_key(), "registry.example.com:5000");
    }

    #[test]
    fn test_convert_to_hostname() {
        assert_eq!(convert_to_hostname("http://example.com/v1/"), "example.com");
        assert_eq!(convert_to_hostname("example.com:443"), "example.com:443");
    }
}
