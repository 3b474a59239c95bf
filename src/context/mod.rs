//! Named contexts: daemon endpoint metadata plus TLS material
//!
//! Persisted contexts live in a [`FileContextStore`]. The `default` context
//! is never persisted; [`ContextStoreWithDefault`] synthesises it from flags
//! and environment on every call and refuses to mutate it.

pub mod default;
pub mod endpoint;
pub mod export;
pub mod store;

pub use default::{ContextStoreWithDefault, DefaultContextOptions};
pub use endpoint::{DockerEndpoint, TlsMaterial};
pub use store::FileContextStore;

use crate::{CliError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Name of the synthesised context
pub const DEFAULT_CONTEXT_NAME: &str = "default";

/// Environment variable selecting the context when no host is set
pub const CONTEXT_ENV: &str = "DOCKER_CONTEXT";

/// Storage path reported for contexts that only exist in memory
pub const IN_MEMORY: &str = "<IN MEMORY>";

/// TLS file names understood by the connection factory
pub const CA_FILE: &str = "ca.pem";
pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// TLS policy of an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsPolicy {
    #[default]
    Off,
    On,
    Verify,
}

impl TlsPolicy {
    fn is_off(&self) -> bool {
        *self == TlsPolicy::Off
    }
}

/// Metadata of one endpoint of a context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointMeta {
    #[serde(rename = "Host", default)]
    pub host: String,

    #[serde(rename = "TLS", default, skip_serializing_if = "TlsPolicy::is_off")]
    pub tls: TlsPolicy,

    #[serde(rename = "SkipTLSVerify", default)]
    pub skip_tls_verify: bool,
}

/// Free-form description block of a context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMeta {
    #[serde(rename = "Description", default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(flatten)]
    pub additional_fields: BTreeMap<String, Value>,
}

/// A context as stored in `meta.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Metadata", default)]
    pub metadata: ContextMeta,

    #[serde(rename = "Endpoints", default)]
    pub endpoints: BTreeMap<String, EndpointMeta>,
}

/// TLS files of one endpoint, keyed by file name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointTlsData {
    pub files: BTreeMap<String, Vec<u8>>,
}

/// TLS files of a whole context, keyed by endpoint name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextTlsData {
    pub endpoints: BTreeMap<String, EndpointTlsData>,
}

/// Where a context keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub metadata_path: String,
    pub tls_path: String,
}

/// Operations over named contexts
pub trait ContextStore: Send + Sync {
    fn list(&self) -> Result<Vec<Metadata>>;

    fn get_metadata(&self, name: &str) -> Result<Metadata>;

    fn create_or_update(&self, meta: &Metadata) -> Result<()>;

    fn remove(&self, name: &str) -> Result<()>;

    /// Replace every endpoint's TLS material
    fn reset_tls(&self, name: &str, data: &ContextTlsData) -> Result<()>;

    /// Replace one endpoint's TLS material
    fn reset_endpoint_tls(&self, name: &str, endpoint: &str, data: &EndpointTlsData)
        -> Result<()>;

    /// TLS file names per endpoint
    fn list_tls_files(&self, name: &str) -> Result<BTreeMap<String, Vec<String>>>;

    fn get_tls_data(&self, name: &str, endpoint: &str, file: &str) -> Result<Vec<u8>>;

    fn storage_info(&self, name: &str) -> StorageInfo;

    fn exists(&self, name: &str) -> bool {
        self.get_metadata(name).is_ok()
    }
}

/// Check that `name` is usable as a persisted context name
pub fn validate_context_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CliError::invalid_argument("context name cannot be empty"));
    }
    if name == DEFAULT_CONTEXT_NAME {
        return Err(CliError::invalid_argument(format!(
            "\"{}\" is a reserved context name",
            name
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || "_.+-".contains(c));
    if !first_ok || !rest_ok {
        return Err(CliError::invalid_argument(format!(
            "context name {:?} is invalid, names are validated against regexp \"^[a-zA-Z0-9][a-zA-Z0-9_.+-]*$\"",
            name
        )));
    }
    Ok(())
}

/// Load the TLS material of `endpoint` in context `name`, if any.
pub fn load_tls_material(
    store: &dyn ContextStore,
    name: &str,
    endpoint: &str,
) -> Result<Option<TlsMaterial>> {
    let files = store.list_tls_files(name)?;
    let Some(names) = files.get(endpoint) else {
        return Ok(None);
    };

    let mut material = TlsMaterial::default();
    for file in names {
        let data = store.get_tls_data(name, endpoint, file)?;
        match file.as_str() {
            CA_FILE => material.ca = Some(data),
            CERT_FILE => material.cert = Some(data),
            KEY_FILE => material.key = Some(data),
            other => tracing::debug!("ignoring unknown TLS file {} in context {}", other, name),
        }
    }
    Ok(Some(material))
}

/// Metadata path helper shared by file-backed implementations
pub(crate) fn display_path(path: PathBuf) -> String {
    path.to_string_lossy().into_owned()
}
