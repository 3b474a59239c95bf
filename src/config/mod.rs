//! On-disk CLI configuration (`config.json`)
//!
//! The configuration is loaded lazily on first access and written back
//! atomically (temp file + rename). Keys the CLI does not understand are kept
//! in a flattened map so a rewrite never drops them.

pub mod credentials;
pub mod paths;

use crate::registry::auth::AuthConfig;
use crate::{CliError, Result};
use base64::Engine;
use paths::CliPaths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Auth entry as persisted in the `auths` section.
///
/// Username and password travel together in `auth` as base64 of
/// `username:password`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        rename = "identitytoken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub identity_token: Option<String>,

    #[serde(
        rename = "registrytoken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub registry_token: Option<String>,
}

impl StoredAuth {
    /// Encode an auth config for storage
    pub fn encode(auth: &AuthConfig) -> Self {
        let auth_field = if auth.username.is_empty() && auth.password.is_empty() {
            None
        } else {
            let raw = format!("{}:{}", auth.username, auth.password);
            Some(base64::engine::general_purpose::STANDARD.encode(raw))
        };

        Self {
            auth: auth_field,
            email: None,
            identity_token: non_empty(&auth.identity_token),
            registry_token: non_empty(&auth.registry_token),
        }
    }

    /// Decode into an auth config for `server_address`
    pub fn decode(&self, server_address: &str) -> Result<AuthConfig> {
        let (username, password) = match self.auth.as_deref() {
            Some(encoded) if !encoded.is_empty() => decode_auth(encoded)?,
            _ => (String::new(), String::new()),
        };

        Ok(AuthConfig {
            username,
            password,
            identity_token: self.identity_token.clone().unwrap_or_default(),
            registry_token: self.registry_token.clone().unwrap_or_default(),
            server_address: server_address.to_string(),
        })
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Decode a base64 `username:password` pair
pub fn decode_auth(encoded: &str) -> Result<(String, String)> {
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| CliError::invalid_argument(format!("invalid auth configuration: {}", e)))?;
    let raw = String::from_utf8(raw)
        .map_err(|_| CliError::invalid_argument("invalid auth configuration: not UTF-8"))?;
    let (user, password) = raw
        .split_once(':')
        .ok_or_else(|| CliError::invalid_argument("invalid auth configuration file"))?;
    Ok((user.to_string(), password.trim_end_matches('\0').to_string()))
}

/// The `config.json` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "auths", default)]
    pub auth_configs: BTreeMap<String, StoredAuth>,

    #[serde(rename = "HttpHeaders", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub http_headers: BTreeMap<String, String>,

    #[serde(rename = "psFormat", default, skip_serializing_if = "Option::is_none")]
    pub ps_format: Option<String>,

    #[serde(rename = "imagesFormat", default, skip_serializing_if = "Option::is_none")]
    pub images_format: Option<String>,

    #[serde(rename = "networksFormat", default, skip_serializing_if = "Option::is_none")]
    pub networks_format: Option<String>,

    #[serde(rename = "volumesFormat", default, skip_serializing_if = "Option::is_none")]
    pub volumes_format: Option<String>,

    #[serde(rename = "pluginsFormat", default, skip_serializing_if = "Option::is_none")]
    pub plugins_format: Option<String>,

    #[serde(rename = "detachKeys", default, skip_serializing_if = "Option::is_none")]
    pub detach_keys: Option<String>,

    #[serde(rename = "credsStore", default, skip_serializing_if = "Option::is_none")]
    pub credentials_store: Option<String>,

    #[serde(rename = "credHelpers", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credential_helpers: BTreeMap<String, String>,

    #[serde(rename = "pruneFilters", default, skip_serializing_if = "Vec::is_empty")]
    pub prune_filters: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<String>,

    #[serde(rename = "currentContext", default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,

    #[serde(rename = "cliPluginsExtraDirs", default, skip_serializing_if = "Vec::is_empty")]
    pub cli_plugins_extra_dirs: Vec<String>,

    /// Plugin-specific subtrees, preserved verbatim
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub plugins: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,

    /// Keys this CLI does not understand
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,

    #[serde(skip)]
    filename: PathBuf,

    #[serde(skip)]
    existed: bool,
}

impl ConfigFile {
    /// Create an empty configuration bound to `filename`
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Load the configuration file from the directory described by `paths`.
    ///
    /// A missing file yields an empty configuration. A malformed file is an
    /// error naming the file.
    pub fn load(paths: &CliPaths) -> Result<Self> {
        let filename = paths.config_file();
        match Self::read_raw(&filename)? {
            Some(data) => Self::from_document(filename, &data),
            None => Ok(Self::new(filename)),
        }
    }

    /// Raw file contents, `None` when the file does not exist.
    fn read_raw(filename: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(filename) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CliError::system(format!(
                "loading config file {}: {}",
                filename.display(),
                e
            ))),
        }
    }

    fn from_document(filename: PathBuf, data: &[u8]) -> Result<Self> {
        let mut config = Self::parse(data).map_err(|e| {
            CliError::system(format!(
                "parsing config file ({}): {}",
                filename.display(),
                e
            ))
        })?;
        config.filename = filename;
        config.existed = true;
        Ok(config)
    }

    /// Parse a configuration document; an empty document is an empty config.
    pub fn parse(data: &[u8]) -> serde_json::Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(data)
    }

    /// Path this configuration is written to
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Whether the file existed when it was loaded
    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Whether experimental CLI features were enabled in the file
    pub fn experimental_enabled(&self) -> bool {
        self.experimental.as_deref() == Some("enabled")
    }

    /// Configured credential helper for `server`, falling back to the global
    /// credentials store.
    pub fn credential_helper_for(&self, server: &str) -> Option<&str> {
        self.credential_helpers
            .get(server)
            .or(self.credentials_store.as_ref())
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Write the configuration atomically.
    pub fn save(&mut self) -> Result<()> {
        if self.filename.as_os_str().is_empty() {
            return Err(CliError::system("can't save config with empty filename"));
        }
        let dir = self
            .filename
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir)?;

        let mut data = serde_json::to_vec_pretty(self)?;
        data.push(b'\n');
        atomic_write(&self.filename, &data, 0o600)?;
        self.existed = true;
        Ok(())
    }
}

/// Write `contents` to `path` through a temporary file in the same directory.
pub fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        set_mode(&tmp, mode)?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Process-wide, lazily loaded configuration.
///
/// The first access reads the file. A file that cannot be read fails that
/// access; a malformed one is reported as a warning and replaced by an empty
/// configuration. Every mutation goes through [`ConfigStore::update`], which
/// holds the lock while writing so config writes are serialised.
#[derive(Debug)]
pub struct ConfigStore {
    paths: CliPaths,
    cell: OnceLock<Mutex<ConfigFile>>,
}

impl ConfigStore {
    pub fn new(paths: CliPaths) -> Self {
        Self {
            paths,
            cell: OnceLock::new(),
        }
    }

    /// Construct a store around an already-loaded configuration
    pub fn with_config(paths: CliPaths, config: ConfigFile) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(Mutex::new(config));
        Self { paths, cell }
    }

    pub fn paths(&self) -> &CliPaths {
        &self.paths
    }

    /// Lock the configuration, loading it on first access.
    ///
    /// A file that exists but cannot be read is an error; malformed JSON
    /// only warns and leaves an empty configuration.
    pub fn lock(&self) -> Result<MutexGuard<'_, ConfigFile>> {
        let mutex = match self.cell.get() {
            Some(mutex) => mutex,
            None => {
                let config = self.read()?;
                // A racing first load may have won; either copy is equivalent.
                let _ = self.cell.set(Mutex::new(config));
                self.cell
                    .get()
                    .ok_or_else(|| CliError::system("configuration store not initialised"))?
            }
        };
        Ok(mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn read(&self) -> Result<ConfigFile> {
        let filename = self.paths.config_file();
        let Some(data) = ConfigFile::read_raw(&filename)? else {
            return Ok(ConfigFile::new(filename));
        };
        ConfigFile::from_document(filename.clone(), &data).or_else(|e| {
            tracing::warn!("Error loading config file: {}", e);
            eprintln!("WARNING: Error {}", e);
            Ok(ConfigFile::new(filename))
        })
    }

    /// Apply `f` to the configuration and persist the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut ConfigFile) -> Result<R>) -> Result<R> {
        let mut config = self.lock()?;
        let result = f(&mut config)?;
        config.save()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
  "auths": {
    "https://index.docker.io/v1/": {
      "auth": "am9lOnNlY3JldA=="
    }
  },
  "psFormat": "table {{.ID}}",
  "credHelpers": {
    "gcr.io": "gcloud"
  },
  "plugins": {
    "compose": {
      "nested": {"keep": [1, 2, {"x": null}]}
    }
  },
  "someFutureKey": {"a": "b"}
}"#;

    #[test]
    fn test_missing_file_is_empty_and_not_existing() {
        let tmp = TempDir::new().unwrap();
        let config = ConfigFile::load(&CliPaths::with_root(tmp.path())).unwrap();
        assert!(!config.existed());
        assert!(config.auth_configs.is_empty());
        assert_eq!(config.filename(), tmp.path().join("config.json"));
    }

    #[test]
    fn test_malformed_file_names_path() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.json"), "{not json").unwrap();
        let err = ConfigFile::load(&CliPaths::with_root(tmp.path())).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_round_trip_preserves_unknown_subtrees() {
        let tmp = TempDir::new().unwrap();
        let paths = CliPaths::with_root(tmp.path());
        fs::write(paths.config_file(), SAMPLE).unwrap();

        let mut first = ConfigFile::load(&paths).unwrap();
        assert!(first.existed());
        first.save().unwrap();

        let second = ConfigFile::load(&paths).unwrap();
        let a = serde_json::to_value(&first).unwrap();
        let b = serde_json::to_value(&second).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            b["plugins"]["compose"]["nested"]["keep"][2]["x"],
            Value::Null
        );
        assert_eq!(b["someFutureKey"]["a"], "b");
        assert_eq!(second.credential_helper_for("gcr.io"), Some("gcloud"));
    }

    #[test]
    fn test_stored_auth_decodes_user_and_password() {
        let config = ConfigFile::parse(SAMPLE.as_bytes()).unwrap();
        let stored = &config.auth_configs["https://index.docker.io/v1/"];
        let auth = stored.decode("https://index.docker.io/v1/").unwrap();
        assert_eq!(auth.username, "joe");
        assert_eq!(auth.password, "secret");

        let encoded = StoredAuth::encode(&auth);
        assert_eq!(encoded.auth.as_deref(), Some("am9lOnNlY3JldA=="));
    }

    #[test]
    fn test_store_update_persists_new_file() {
        let tmp = TempDir::new().unwrap();
        let paths = CliPaths::with_root(tmp.path().join("nested"));
        let store = ConfigStore::new(paths.clone());

        store
            .update(|cfg| {
                cfg.current_context = Some("remote".to_string());
                Ok(())
            })
            .unwrap();

        let reloaded = ConfigFile::load(&paths).unwrap();
        assert_eq!(reloaded.current_context.as_deref(), Some("remote"));
        assert!(store.lock().unwrap().existed());
    }

    #[test]
    fn test_store_malformed_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.json"), "{not json").unwrap();
        let store = ConfigStore::new(CliPaths::with_root(tmp.path()));
        let config = store.lock().unwrap();
        assert!(config.auth_configs.is_empty());
        assert!(!config.existed());
    }

    #[test]
    fn test_store_unreadable_file_is_fatal() {
        let tmp = TempDir::new().unwrap();
        // A directory where the file should be cannot be read as one.
        std::fs::create_dir(tmp.path().join("config.json")).unwrap();
        let store = ConfigStore::new(CliPaths::with_root(tmp.path()));
        let err = store.lock().unwrap_err();
        assert!(err.to_string().contains("loading config file"), "{}", err);
    }
}
