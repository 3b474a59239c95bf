//! The synthesised `default` context

use super::{
    ContextStore, ContextTlsData, EndpointMeta, EndpointTlsData, Metadata, StorageInfo,
    TlsMaterial, TlsPolicy, CA_FILE, CERT_FILE, DEFAULT_CONTEXT_NAME, IN_MEMORY, KEY_FILE,
};
use crate::config::paths::DOCKER_ENDPOINT;
use crate::{CliError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host used when neither flags, environment nor a context name one
pub const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

pub const HOST_ENV: &str = "DOCKER_HOST";
pub const TLS_VERIFY_ENV: &str = "DOCKER_TLS_VERIFY";
pub const CERT_PATH_ENV: &str = "DOCKER_CERT_PATH";

const DEFAULT_DESCRIPTION: &str = "Current DOCKER_HOST based configuration";

/// Environment lookup used by the default context
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lookup into the process environment, ignoring empty values
pub fn process_env() -> EnvLookup {
    Arc::new(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Flags that shape the default context
#[derive(Debug, Clone, Default)]
pub struct DefaultContextOptions {
    pub hosts: Vec<String>,
    pub tls: bool,
    pub tls_verify: bool,
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
}

/// The default context as seen right now
#[derive(Debug, Clone)]
pub struct DefaultContext {
    pub meta: Metadata,
    pub material: TlsMaterial,
}

impl DefaultContextOptions {
    /// Build the default context from flags, then environment.
    pub fn resolve(&self, env: &EnvLookup, config_dir: &Path) -> Result<DefaultContext> {
        let host = match self.hosts.as_slice() {
            [] => env(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            [host] => host.clone(),
            _ => return Err(CliError::invalid_argument("Specify only one -H")),
        };

        let tls = if self.tls_verify || env(TLS_VERIFY_ENV).is_some() {
            TlsPolicy::Verify
        } else if self.tls {
            TlsPolicy::On
        } else {
            TlsPolicy::Off
        };

        let material = if tls == TlsPolicy::Off {
            TlsMaterial::default()
        } else {
            let cert_dir = env(CERT_PATH_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| config_dir.to_path_buf());
            TlsMaterial {
                ca: read_tls_file(self.ca.as_deref(), &cert_dir.join(CA_FILE))?,
                cert: read_tls_file(self.cert.as_deref(), &cert_dir.join(CERT_FILE))?,
                key: read_tls_file(self.key.as_deref(), &cert_dir.join(KEY_FILE))?,
            }
        };

        let mut meta = Metadata {
            name: DEFAULT_CONTEXT_NAME.to_string(),
            ..Default::default()
        };
        meta.metadata.description = DEFAULT_DESCRIPTION.to_string();
        meta.endpoints.insert(
            DOCKER_ENDPOINT.to_string(),
            EndpointMeta {
                host,
                tls,
                skip_tls_verify: tls == TlsPolicy::On,
            },
        );

        Ok(DefaultContext { meta, material })
    }
}

/// An explicit flag must point at an existing file; the fallback is optional.
fn read_tls_file(explicit: Option<&Path>, fallback: &Path) -> Result<Option<Vec<u8>>> {
    match explicit {
        Some(path) => std::fs::read(path).map(Some).map_err(|e| {
            CliError::invalid_argument(format!(
                "could not read TLS file {}: {}",
                path.display(),
                e
            ))
        }),
        None => match std::fs::read(fallback) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        },
    }
}

/// Context store that serves `default` from memory and delegates the rest
pub struct ContextStoreWithDefault {
    inner: Box<dyn ContextStore>,
    options: DefaultContextOptions,
    env: EnvLookup,
    config_dir: PathBuf,
}

impl ContextStoreWithDefault {
    pub fn new(
        inner: Box<dyn ContextStore>,
        options: DefaultContextOptions,
        env: EnvLookup,
        config_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner,
            options,
            env,
            config_dir: config_dir.into(),
        }
    }

    /// The default context, resolved from the current flags and environment
    pub fn default_context(&self) -> Result<DefaultContext> {
        self.options.resolve(&self.env, &self.config_dir)
    }

    fn default_files(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let material = self.default_context()?.material;
        let mut files = BTreeMap::new();
        for (name, data) in [
            (CA_FILE, material.ca),
            (CERT_FILE, material.cert),
            (KEY_FILE, material.key),
        ] {
            if let Some(data) = data {
                files.insert(name.to_string(), data);
            }
        }
        Ok(files)
    }
}

fn is_default(name: &str) -> bool {
    name == DEFAULT_CONTEXT_NAME
}

impl ContextStore for ContextStoreWithDefault {
    fn list(&self) -> Result<Vec<Metadata>> {
        let mut contexts = vec![self.default_context()?.meta];
        contexts.extend(
            self.inner
                .list()?
                .into_iter()
                .filter(|m| !is_default(&m.name)),
        );
        Ok(contexts)
    }

    fn get_metadata(&self, name: &str) -> Result<Metadata> {
        if is_default(name) {
            return Ok(self.default_context()?.meta);
        }
        self.inner.get_metadata(name)
    }

    fn create_or_update(&self, meta: &Metadata) -> Result<()> {
        if is_default(&meta.name) {
            return Err(CliError::invalid_argument(
                "default context cannot be created nor updated",
            ));
        }
        self.inner.create_or_update(meta)
    }

    fn remove(&self, name: &str) -> Result<()> {
        if is_default(name) {
            return Err(CliError::invalid_argument("default context cannot be removed"));
        }
        self.inner.remove(name)
    }

    fn reset_tls(&self, name: &str, data: &ContextTlsData) -> Result<()> {
        if is_default(name) {
            return Err(CliError::invalid_argument("default context cannot be edited"));
        }
        self.inner.reset_tls(name, data)
    }

    fn reset_endpoint_tls(
        &self,
        name: &str,
        endpoint: &str,
        data: &EndpointTlsData,
    ) -> Result<()> {
        if is_default(name) {
            return Err(CliError::invalid_argument("default context cannot be edited"));
        }
        self.inner.reset_endpoint_tls(name, endpoint, data)
    }

    fn list_tls_files(&self, name: &str) -> Result<BTreeMap<String, Vec<String>>> {
        if !is_default(name) {
            return self.inner.list_tls_files(name);
        }
        let files = self.default_files()?;
        let mut result = BTreeMap::new();
        if !files.is_empty() {
            result.insert(DOCKER_ENDPOINT.to_string(), files.into_keys().collect());
        }
        Ok(result)
    }

    fn get_tls_data(&self, name: &str, endpoint: &str, file: &str) -> Result<Vec<u8>> {
        if !is_default(name) {
            return self.inner.get_tls_data(name, endpoint, file);
        }
        if endpoint != DOCKER_ENDPOINT {
            return Err(CliError::not_found(format!(
                "TLS data for {}/{}/{} does not exist",
                name, endpoint, file
            )));
        }
        self.default_files()?.remove(file).ok_or_else(|| {
            CliError::not_found(format!(
                "TLS data for {}/{}/{} does not exist",
                name, endpoint, file
            ))
        })
    }

    fn storage_info(&self, name: &str) -> StorageInfo {
        if is_default(name) {
            return StorageInfo {
                metadata_path: IN_MEMORY.to_string(),
                tls_path: IN_MEMORY.to_string(),
            };
        }
        self.inner.storage_info(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths::CliPaths;
    use crate::context::FileContextStore;
    use crate::ErrorKind;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> EnvLookup {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key| map.get(key).cloned())
    }

    fn make_store(
        tmp: &TempDir,
        options: DefaultContextOptions,
        env: EnvLookup,
    ) -> ContextStoreWithDefault {
        let paths = CliPaths::with_root(tmp.path());
        ContextStoreWithDefault::new(
            Box::new(FileContextStore::new(&paths)),
            options,
            env,
            tmp.path(),
        )
    }

    #[test]
    fn test_default_reads_env_host() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(
            &tmp,
            DefaultContextOptions::default(),
            env_of(&[("DOCKER_HOST", "tcp://10.0.0.1:2375")]),
        );
        let meta = store.get_metadata("default").unwrap();
        assert_eq!(meta.endpoints["docker"].host, "tcp://10.0.0.1:2375");
        assert_eq!(meta.endpoints["docker"].tls, TlsPolicy::Off);
    }

    #[test]
    fn test_flag_host_wins_and_only_one_allowed() {
        let tmp = TempDir::new().unwrap();
        let options = DefaultContextOptions {
            hosts: vec!["unix:///tmp/d.sock".into()],
            ..Default::default()
        };
        let store = make_store(&tmp, options, env_of(&[("DOCKER_HOST", "tcp://x:1")]));
        let meta = store.get_metadata("default").unwrap();
        assert_eq!(meta.endpoints["docker"].host, "unix:///tmp/d.sock");

        let options = DefaultContextOptions {
            hosts: vec!["tcp://a:1".into(), "tcp://b:1".into()],
            ..Default::default()
        };
        let store = make_store(&tmp, options, env_of(&[]));
        assert!(store.get_metadata("default").is_err());
    }

    #[test]
    fn test_default_rejects_mutation() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp, DefaultContextOptions::default(), env_of(&[]));

        let meta = store.get_metadata("default").unwrap();
        let err = store.create_or_update(&meta).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            err.to_string(),
            "default context cannot be created nor updated"
        );

        let err = store.remove("default").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            store.storage_info("default").metadata_path,
            "<IN MEMORY>"
        );
    }

    #[test]
    fn test_default_tls_held_in_memory() {
        let tmp = TempDir::new().unwrap();
        let certs = tmp.path().join("certs");
        std::fs::create_dir_all(&certs).unwrap();
        std::fs::write(certs.join("ca.pem"), b"CA").unwrap();

        let store = make_store(
            &tmp,
            DefaultContextOptions::default(),
            env_of(&[
                ("DOCKER_TLS_VERIFY", "1"),
                ("DOCKER_CERT_PATH", certs.to_str().unwrap()),
            ]),
        );

        let meta = store.get_metadata("default").unwrap();
        assert_eq!(meta.endpoints["docker"].tls, TlsPolicy::Verify);
        assert_eq!(store.list_tls_files("default").unwrap()["docker"], vec!["ca.pem"]);
        assert_eq!(store.get_tls_data("default", "docker", "ca.pem").unwrap(), b"CA");
        assert!(store.get_tls_data("default", "docker", "key.pem").is_err());
    }

    #[test]
    fn test_list_puts_default_first() {
        let tmp = TempDir::new().unwrap();
        let store = make_store(&tmp, DefaultContextOptions::default(), env_of(&[]));
        let mut meta = store.get_metadata("default").unwrap();
        meta.name = "other".into();
        store.create_or_update(&meta).unwrap();

        let names: Vec<_> = store.list().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["default", "other"]);
    }
}
