//! The resolved daemon endpoint of a context

use super::{load_tls_material, ContextStore, Metadata, TlsPolicy};
use crate::config::paths::DOCKER_ENDPOINT;
use crate::{CliError, Result};

/// PEM-encoded TLS material of an endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    pub ca: Option<Vec<u8>>,
    pub cert: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
}

impl TlsMaterial {
    pub fn is_empty(&self) -> bool {
        self.ca.is_none() && self.cert.is_none() && self.key.is_none()
    }
}

/// Everything the connection factory needs to reach a daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerEndpoint {
    pub context: String,
    pub host: String,
    pub tls: TlsPolicy,
    pub skip_tls_verify: bool,
    pub material: TlsMaterial,
}

impl DockerEndpoint {
    /// Resolve the `docker` endpoint of the named context
    pub fn resolve(store: &dyn ContextStore, name: &str) -> Result<Self> {
        let meta = store.get_metadata(name)?;
        let material = load_tls_material(store, name, DOCKER_ENDPOINT)?.unwrap_or_default();
        Self::from_metadata(&meta, material)
    }

    pub fn from_metadata(meta: &Metadata, material: TlsMaterial) -> Result<Self> {
        let endpoint = meta.endpoints.get(DOCKER_ENDPOINT).ok_or_else(|| {
            CliError::invalid_argument(format!(
                "context {:?} has no {} endpoint",
                meta.name, DOCKER_ENDPOINT
            ))
        })?;

        // Stored TLS material implies TLS even when the policy was not recorded.
        let tls = match endpoint.tls {
            TlsPolicy::Off if !material.is_empty() => {
                if endpoint.skip_tls_verify {
                    TlsPolicy::On
                } else {
                    TlsPolicy::Verify
                }
            }
            policy => policy,
        };

        Ok(Self {
            context: meta.name.clone(),
            host: endpoint.host.clone(),
            tls,
            skip_tls_verify: endpoint.skip_tls_verify,
            material,
        })
    }
}
