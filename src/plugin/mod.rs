//! Out-of-tree CLI plugins
//!
//! A plugin is an executable named `docker-<name>` in one of the plugin
//! directories. It is trusted only after answering the metadata probe
//! (`docker-<name> docker-cli-plugin-metadata`) with a valid document.

pub mod dial_stdio;
pub mod manager;
pub mod run;
pub mod socket;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use manager::{get_plugin, list_plugins, search_dirs};
pub use run::{run_plugin, GlobalFlags};

/// Filename prefix of plugin binaries
pub const NAME_PREFIX: &str = "docker-";

/// Subcommand every plugin answers with its metadata
pub const METADATA_SUBCOMMAND: &str = "docker-cli-plugin-metadata";

/// The only schema version understood
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Set for the plugin to the executable of the parent CLI
pub const ORIGINAL_CLI_COMMAND_ENV: &str = "DOCKER_CLI_PLUGIN_ORIGINAL_CLI_COMMAND";

/// Set for the plugin to the path of the control socket
pub const SOCKET_ENV: &str = "DOCKER_CLI_PLUGIN_SOCKET";

/// The metadata document a plugin prints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    pub schema_version: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_description: String,
    #[serde(rename = "URL", default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub experimental: bool,
}

/// A discovered plugin. `error` is set when it must not be invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plugin {
    pub name: String,
    pub path: PathBuf,
    pub metadata: Metadata,
    pub error: Option<String>,
    /// Same-named candidates in lower-priority directories
    pub shadowed_paths: Vec<PathBuf>,
}

impl Plugin {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// `true` for names a plugin may use
pub fn valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
