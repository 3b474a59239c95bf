//! Plugin discovery and validation

use super::{valid_name, Metadata, Plugin, METADATA_SUBCOMMAND, NAME_PREFIX, SCHEMA_VERSION};
use crate::config::paths::CliPaths;
use crate::config::ConfigFile;
use crate::{CliError, Result};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// System-wide plugin directories, searched after the user's
pub const SYSTEM_DIRS: &[&str] = &[
    "/usr/local/lib/docker/cli-plugins",
    "/usr/local/libexec/docker/cli-plugins",
    "/usr/lib/docker/cli-plugins",
    "/usr/libexec/docker/cli-plugins",
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Directories to search, highest priority first
pub fn search_dirs(paths: &CliPaths, config: &ConfigFile) -> Vec<PathBuf> {
    let mut dirs = vec![paths.plugins_dir()];
    dirs.extend(config.cli_plugins_extra_dirs.iter().map(PathBuf::from));
    dirs.extend(SYSTEM_DIRS.iter().map(PathBuf::from));
    dirs
}

/// Plugin files found by a directory scan
#[derive(Debug, Default)]
struct Scan {
    /// Executable candidates by plugin name; the first path has priority.
    found: BTreeMap<String, Vec<PathBuf>>,
    /// Names matched only by files without an execute bit
    not_executable: BTreeMap<String, PathBuf>,
}

fn is_executable(meta: &std::fs::Metadata) -> bool {
    meta.permissions().mode() & 0o111 != 0
}

fn candidates(dirs: &[PathBuf]) -> Scan {
    let mut scan = Scan::default();
    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("skipping plugin directory {}: {}", dir.display(), e);
                }
                continue;
            }
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(|n| n.strip_prefix(NAME_PREFIX)) else {
                continue;
            };
            // Follows symlinks so linked plugins are found.
            let Ok(meta) = std::fs::metadata(entry.path()) else {
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            if !is_executable(&meta) {
                scan.not_executable
                    .entry(name.to_string())
                    .or_insert_with(|| entry.path());
                continue;
            }
            scan.found
                .entry(name.to_string())
                .or_default()
                .push(entry.path());
        }
    }
    scan
}

/// Run the metadata probe and check the document.
async fn probe(path: &Path) -> std::result::Result<Metadata, String> {
    let output = Command::new(path)
        .arg(METADATA_SUBCOMMAND)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(PROBE_TIMEOUT, output)
        .await
        .map_err(|_| "failed to fetch metadata: timed out".to_string())?
        .map_err(|e| format!("failed to fetch metadata: {}", e))?;
    if !output.status.success() {
        return Err(format!("failed to fetch metadata: {}", output.status));
    }

    let metadata: Metadata = serde_json::from_slice(&output.stdout)
        .map_err(|e| format!("invalid metadata: {}", e))?;
    if metadata.schema_version != SCHEMA_VERSION {
        return Err(format!(
            "plugin SchemaVersion {:?} is not valid, must be {}",
            metadata.schema_version, SCHEMA_VERSION
        ));
    }
    if metadata.vendor.is_empty() {
        return Err("plugin metadata does not define a vendor".to_string());
    }
    Ok(metadata)
}

async fn validate(name: String, mut paths: Vec<PathBuf>, builtins: &[String]) -> Plugin {
    let path = paths.remove(0);
    let mut plugin = Plugin {
        name,
        path,
        metadata: Metadata::default(),
        error: None,
        shadowed_paths: paths,
    };

    if !valid_name(&plugin.name) {
        plugin.error = Some(format!(
            "plugin candidate {:?} did not match \"^[a-z][a-z0-9]*$\"",
            plugin.name
        ));
        return plugin;
    }
    if builtins.iter().any(|b| *b == plugin.name) {
        plugin.error = Some(format!("plugin {:?} duplicates builtin command", plugin.name));
        return plugin;
    }
    if let Some(other) = plugin.shadowed_paths.first() {
        plugin.error = Some(format!(
            "plugin {:?} collides with {}",
            plugin.name,
            other.display()
        ));
        return plugin;
    }
    match probe(&plugin.path).await {
        Ok(metadata) => plugin.metadata = metadata,
        Err(e) => plugin.error = Some(e),
    }
    plugin
}

/// Every plugin in `dirs`, invalid ones included, sorted by name.
pub async fn list_plugins(dirs: &[PathBuf], builtins: &[String]) -> Vec<Plugin> {
    let probes = candidates(dirs)
        .found
        .into_iter()
        .map(|(name, paths)| validate(name, paths, builtins));
    join_all(probes).await
}

/// Find and validate one plugin.
///
/// A missing plugin is [`CliError::NotFound`]; one present only without
/// an execute bit is [`CliError::Forbidden`]; an invalid one is
/// [`CliError::InvalidArgument`] carrying the validation error.
pub async fn get_plugin(name: &str, dirs: &[PathBuf], builtins: &[String]) -> Result<Plugin> {
    let mut scan = candidates(dirs);
    let Some(paths) = scan.found.remove(name) else {
        return Err(match scan.not_executable.remove(name) {
            Some(path) => CliError::Forbidden(format!(
                "docker: plugin {} is not executable",
                path.display()
            )),
            None => CliError::not_found(format!("docker: '{}' is not a docker command.", name)),
        });
    };
    let plugin = validate(name.to_string(), paths, builtins).await;
    match &plugin.error {
        None => Ok(plugin),
        Some(e) => Err(CliError::invalid_argument(format!(
            "docker: '{}' is not a valid plugin: {}",
            name, e
        ))),
    }
}
