//! Credentials kept in plain text in config.json

use super::CredentialStore;
use crate::config::{ConfigStore, StoredAuth};
use crate::registry::auth::{convert_to_hostname, AuthConfig, INDEX_SERVER};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Credential store backed by the `auths` section of the config file
#[derive(Clone)]
pub struct FileStore {
    config: Arc<ConfigStore>,
}

impl FileStore {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, server: &str) -> Result<AuthConfig> {
        let config = self.config.lock()?;
        if let Some(stored) = config.auth_configs.get(server) {
            return stored.decode(server);
        }

        // Entries may be keyed by a full URL; compare canonical hostnames.
        let wanted = convert_to_hostname(server);
        for (key, stored) in &config.auth_configs {
            if convert_to_hostname(key) == wanted {
                return stored.decode(server);
            }
        }

        Ok(AuthConfig {
            server_address: server.to_string(),
            ..Default::default()
        })
    }

    async fn get_all(&self) -> Result<BTreeMap<String, AuthConfig>> {
        let config = self.config.lock()?;
        config
            .auth_configs
            .iter()
            .map(|(key, stored)| Ok((key.clone(), stored.decode(key)?)))
            .collect()
    }

    async fn store(&self, auth: &AuthConfig) -> Result<()> {
        let key = canonical_key(&auth.server_address);
        self.config.update(|config| {
            config.auth_configs.insert(key, StoredAuth::encode(auth));
            Ok(())
        })
    }

    async fn erase(&self, server: &str) -> Result<()> {
        let key = canonical_key(server);
        self.config.update(|config| {
            config.auth_configs.remove(server);
            config.auth_configs.remove(&key);
            Ok(())
        })
    }
}

/// Persisted keys are canonical hostnames, except for the official index.
fn canonical_key(server: &str) -> String {
    if server == INDEX_SERVER {
        return server.to_string();
    }
    convert_to_hostname(server)
}
