//! Path management for the ~/.docker/ directory structure

use crate::{CliError, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "DOCKER_CONFIG";

/// Name of the configuration directory under the user's home
pub const CONFIG_DIR_NAME: &str = ".docker";

/// Name of the configuration file inside the configuration directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Endpoint name under which the daemon endpoint of a context is stored
pub const DOCKER_ENDPOINT: &str = "docker";

/// Manages paths below the CLI configuration directory
#[derive(Debug, Clone)]
pub struct CliPaths {
    root: PathBuf,
}

impl CliPaths {
    /// Resolve the configuration directory: explicit flag, then
    /// `DOCKER_CONFIG`, then `~/.docker`.
    pub fn resolve(flag: Option<&Path>) -> Result<Self> {
        if let Some(dir) = flag {
            return Ok(Self::with_root(dir));
        }
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::with_root(PathBuf::from(dir)));
        }
        Self::new()
    }

    /// Create a new CliPaths instance using the default root (~/.docker/)
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            CliError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine user home directory. Please ensure HOME environment variable is set.",
            ))
        })?;

        Ok(Self {
            root: home.join(CONFIG_DIR_NAME),
        })
    }

    /// Create a new CliPaths instance with a custom root
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The config.json file
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Root of the context store
    pub fn contexts_dir(&self) -> PathBuf {
        self.root.join("contexts")
    }

    /// Directory holding one metadata directory per context
    pub fn context_meta_root(&self) -> PathBuf {
        self.contexts_dir().join("meta")
    }

    /// Directory holding one TLS directory per context
    pub fn context_tls_root(&self) -> PathBuf {
        self.contexts_dir().join("tls")
    }

    /// Directory containing user-installed CLI plugins
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_structure() {
        let tmp = TempDir::new().unwrap();
        let paths = CliPaths::with_root(tmp.path());

        assert_eq!(paths.root(), tmp.path());
        assert_eq!(paths.config_file(), tmp.path().join("config.json"));
        assert_eq!(
            paths.context_meta_root(),
            tmp.path().join("contexts/meta")
        );
        assert_eq!(paths.context_tls_root(), tmp.path().join("contexts/tls"));
        assert_eq!(paths.plugins_dir(), tmp.path().join("plugins"));
    }

    #[test]
    fn test_flag_wins_over_environment() {
        let tmp = TempDir::new().unwrap();
        let paths = CliPaths::resolve(Some(tmp.path())).unwrap();
        assert_eq!(paths.root(), tmp.path());
    }
}
