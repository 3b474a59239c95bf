//! Credential stores and the per-process credential resolver

mod file_store;
mod native_store;

pub use file_store::FileStore;
pub use native_store::{NativeStore, HELPER_TIMEOUT};

use crate::config::ConfigStore;
use crate::registry::auth::{AuthConfig, IndexInfo};
use crate::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// A place credentials are read from and written to
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials for `server`; the zero entry when none are stored.
    async fn get(&self, server: &str) -> Result<AuthConfig>;

    /// All stored credentials, keyed by server address
    async fn get_all(&self) -> Result<BTreeMap<String, AuthConfig>>;

    async fn store(&self, auth: &AuthConfig) -> Result<()>;

    async fn erase(&self, server: &str) -> Result<()>;
}

/// Resolves credentials per registry index, invoking helpers where the
/// configuration names one and caching results for the process lifetime.
///
/// Concurrent lookups of the same key share one helper invocation.
pub struct CredentialResolver {
    config: Arc<ConfigStore>,
    cache: Mutex<HashMap<String, Arc<OnceCell<AuthConfig>>>>,
}

impl CredentialResolver {
    pub fn new(config: Arc<ConfigStore>) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The store responsible for `server_address`
    pub fn store_for(&self, server_address: &str) -> Result<Box<dyn CredentialStore>> {
        let file_store = FileStore::new(self.config.clone());
        let helper = self
            .config
            .lock()?
            .credential_helper_for(server_address)
            .map(str::to_string);
        Ok(match helper {
            Some(helper) => Box::new(NativeStore::new(&helper, file_store)),
            None => Box::new(file_store),
        })
    }

    /// Credentials for a registry index, or the zero entry.
    pub async fn resolve(&self, index: &IndexInfo) -> Result<AuthConfig> {
        let key = index.auth_key();
        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            cache.entry(key.clone()).or_default().clone()
        };

        let auth = cell
            .get_or_try_init(|| async {
                tracing::debug!(server = %key, "looking up registry credentials");
                self.store_for(&key)?.get(&key).await
            })
            .await?;
        Ok(auth.clone())
    }

    /// Persist credentials and refresh the cache entry.
    pub async fn store(&self, auth: &AuthConfig) -> Result<()> {
        self.store_for(&auth.server_address)?.store(auth).await?;
        self.invalidate(&auth.server_address);
        Ok(())
    }

    /// Remove credentials for `server_address` from its store.
    pub async fn erase(&self, server_address: &str) -> Result<()> {
        self.store_for(server_address)?.erase(server_address).await?;
        self.invalidate(server_address);
        Ok(())
    }

    fn invalidate(&self, key: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        cache.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::CliPaths;
    use crate::registry::auth::INDEX_SERVER;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_resolver_reads_file_store_and_caches() {
        let tmp = TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::new(CliPaths::with_root(tmp.path())));
        let resolver = CredentialResolver::new(config.clone());

        let empty = resolver.resolve(&IndexInfo::official()).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.server_address, INDEX_SERVER);

        resolver
            .store(&AuthConfig {
                username: "joe".into(),
                password: "pw".into(),
                server_address: INDEX_SERVER.into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = resolver.resolve(&IndexInfo::official()).await.unwrap();
        assert_eq!(found.username, "joe");
        assert_eq!(found.password, "pw");

        resolver.erase(INDEX_SERVER).await.unwrap();
        assert!(resolver
            .resolve(&IndexInfo::official())
            .await
            .unwrap()
            .is_empty());
    }
}
