//! File-backed context store
//!
//! Layout below the contexts directory:
//!
//! ```text
//! meta/<hash>/meta.json
//! tls/<hash>/<endpoint>/<file>
//! ```
//!
//! `<hash>` is the hex SHA-256 of the context name. Mutations hold an
//! exclusive lock on the `meta/<hash>` directory itself; reads take no lock
//! and skip entries that fail to parse.

use super::{
    display_path, validate_context_name, ContextStore, ContextTlsData, EndpointTlsData, Metadata,
    StorageInfo,
};
use crate::config::atomic_write;
use crate::config::paths::CliPaths;
use crate::{CliError, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

const META_FILE: &str = "meta.json";

/// Stable filesystem-safe key of a context name
pub fn context_dir_name(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

/// Context store rooted in `<config-dir>/contexts`
#[derive(Debug, Clone)]
pub struct FileContextStore {
    meta_root: PathBuf,
    tls_root: PathBuf,
}

/// RAII exclusive lock on a context's metadata directory
struct ContextLock {
    dir: File,
}

impl ContextLock {
    fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let dir = File::open(dir)?;
        dir.lock_exclusive()?;
        Ok(Self { dir })
    }
}

impl Drop for ContextLock {
    fn drop(&mut self) {
        let _ = self.dir.unlock();
    }
}

impl FileContextStore {
    pub fn new(paths: &CliPaths) -> Self {
        Self {
            meta_root: paths.context_meta_root(),
            tls_root: paths.context_tls_root(),
        }
    }

    fn meta_dir(&self, name: &str) -> PathBuf {
        self.meta_root.join(context_dir_name(name))
    }

    fn tls_dir(&self, name: &str) -> PathBuf {
        self.tls_root.join(context_dir_name(name))
    }

    fn lock(&self, name: &str) -> Result<ContextLock> {
        ContextLock::acquire(&self.meta_dir(name))
    }

    fn read_meta(path: &Path) -> Result<Metadata> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn not_found(name: &str) -> CliError {
        CliError::not_found(format!("no such context: {}", name))
    }

    fn write_endpoint_tls(&self, name: &str, endpoint: &str, data: &EndpointTlsData) -> Result<()> {
        let dir = self.tls_dir(name).join(endpoint);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        if data.files.is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&dir)?;
        for (file, contents) in &data.files {
            validate_file_component(file)?;
            atomic_write(&dir.join(file), contents, 0o600)?;
        }
        Ok(())
    }
}

fn validate_file_component(part: &str) -> Result<()> {
    if part.is_empty() || part == "." || part == ".." || part.contains('/') || part.contains('\\') {
        return Err(CliError::invalid_argument(format!(
            "invalid TLS file or endpoint name: {:?}",
            part
        )));
    }
    Ok(())
}

impl ContextStore for FileContextStore {
    fn list(&self) -> Result<Vec<Metadata>> {
        let entries = match fs::read_dir(&self.meta_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut contexts = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join(META_FILE);
            match Self::read_meta(&meta_path) {
                Ok(meta) => contexts.push(meta),
                Err(e) => {
                    tracing::debug!("skipping context entry {}: {}", meta_path.display(), e)
                }
            }
        }
        contexts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(contexts)
    }

    fn get_metadata(&self, name: &str) -> Result<Metadata> {
        let path = self.meta_dir(name).join(META_FILE);
        match Self::read_meta(&path) {
            Ok(meta) => Ok(meta),
            Err(CliError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Self::not_found(name))
            }
            Err(e) => Err(e),
        }
    }

    fn create_or_update(&self, meta: &Metadata) -> Result<()> {
        validate_context_name(&meta.name)?;
        for endpoint in meta.endpoints.keys() {
            validate_file_component(endpoint)?;
        }
        let _lock = self.lock(&meta.name)?;
        let dir = self.meta_dir(&meta.name);
        let data = serde_json::to_vec(meta)?;
        atomic_write(&dir.join(META_FILE), &data, 0o644)?;
        tracing::debug!(context = %meta.name, "context metadata written");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        if !self.meta_dir(name).exists() {
            return Err(Self::not_found(name));
        }
        let _lock = self.lock(name)?;
        fs::remove_dir_all(self.meta_dir(name))?;
        let tls = self.tls_dir(name);
        if tls.exists() {
            fs::remove_dir_all(tls)?;
        }
        Ok(())
    }

    fn reset_tls(&self, name: &str, data: &ContextTlsData) -> Result<()> {
        if !self.meta_dir(name).exists() {
            return Err(Self::not_found(name));
        }
        let _lock = self.lock(name)?;
        let tls = self.tls_dir(name);
        if tls.exists() {
            fs::remove_dir_all(&tls)?;
        }
        for (endpoint, files) in &data.endpoints {
            validate_file_component(endpoint)?;
            self.write_endpoint_tls(name, endpoint, files)?;
        }
        Ok(())
    }

    fn reset_endpoint_tls(
        &self,
        name: &str,
        endpoint: &str,
        data: &EndpointTlsData,
    ) -> Result<()> {
        if !self.meta_dir(name).exists() {
            return Err(Self::not_found(name));
        }
        validate_file_component(endpoint)?;
        let _lock = self.lock(name)?;
        self.write_endpoint_tls(name, endpoint, data)
    }

    fn list_tls_files(&self, name: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let mut result = BTreeMap::new();
        let endpoints = match fs::read_dir(self.tls_dir(name)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
            Err(e) => return Err(e.into()),
        };

        for endpoint in endpoints {
            let endpoint = endpoint?;
            if !endpoint.file_type()?.is_dir() {
                continue;
            }
            let mut files = Vec::new();
            for file in fs::read_dir(endpoint.path())? {
                let file = file?;
                if file.file_type()?.is_file() {
                    files.push(file.file_name().to_string_lossy().into_owned());
                }
            }
            files.sort();
            result.insert(endpoint.file_name().to_string_lossy().into_owned(), files);
        }
        Ok(result)
    }

    fn get_tls_data(&self, name: &str, endpoint: &str, file: &str) -> Result<Vec<u8>> {
        validate_file_component(endpoint)?;
        validate_file_component(file)?;
        let path = self.tls_dir(name).join(endpoint).join(file);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CliError::not_found(format!(
                    "TLS data for {}/{}/{} does not exist",
                    name, endpoint, file
                ))
            } else {
                e.into()
            }
        })
    }

    fn storage_info(&self, name: &str) -> StorageInfo {
        StorageInfo {
            metadata_path: display_path(self.meta_dir(name)),
            tls_path: display_path(self.tls_dir(name)),
        }
    }
}
