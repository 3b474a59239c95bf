//! Context import/export as a single tar stream
//!
//! Entries: `meta.json` followed by `tls/<endpoint>/<file>` for every TLS
//! file of the context.

use super::{validate_context_name, ContextStore, ContextTlsData, Metadata};
use crate::{CliError, Result};
use std::io::{Read, Write};

const META_ENTRY: &str = "meta.json";
const TLS_PREFIX: &str = "tls/";

/// Write context `name`, including its TLS material, as a tar stream.
pub fn export_context(store: &dyn ContextStore, name: &str, out: impl Write) -> Result<()> {
    let meta = store.get_metadata(name)?;
    let mut builder = tar::Builder::new(out);

    append_file(&mut builder, META_ENTRY, &serde_json::to_vec(&meta)?, 0o644)?;
    for (endpoint, files) in store.list_tls_files(name)? {
        for file in files {
            let data = store.get_tls_data(name, &endpoint, &file)?;
            let path = format!("{}{}/{}", TLS_PREFIX, endpoint, file);
            append_file(&mut builder, &path, &data, 0o600)?;
        }
    }

    builder.into_inner()?.flush()?;
    Ok(())
}

fn append_file<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    data: &[u8],
    mode: u32,
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_entry_type(tar::EntryType::Regular);
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

/// Read a tar stream produced by [`export_context`] into a new context `name`.
pub fn import_context(store: &dyn ContextStore, name: &str, reader: impl Read) -> Result<()> {
    validate_context_name(name)?;
    if store.exists(name) {
        return Err(CliError::Conflict(format!(
            "context {:?} already exists",
            name
        )));
    }

    let mut archive = tar::Archive::new(reader);
    let mut meta: Option<Metadata> = None;
    let mut tls = ContextTlsData::default();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;

        if path == META_ENTRY {
            meta = Some(serde_json::from_slice(&data).map_err(|e| {
                CliError::invalid_argument(format!("invalid context metadata: {}", e))
            })?);
        } else if let Some(rest) = path.strip_prefix(TLS_PREFIX) {
            let (endpoint, file) = rest
                .split_once('/')
                .filter(|(endpoint, file)| !endpoint.is_empty() && !file.contains('/'))
                .ok_or_else(|| {
                    CliError::invalid_argument(format!("unexpected context archive entry {}", path))
                })?;
            tls.endpoints
                .entry(endpoint.to_string())
                .or_default()
                .files
                .insert(file.to_string(), data);
        } else {
            tracing::debug!("ignoring unexpected context archive entry {}", path);
        }
    }

    let mut meta =
        meta.ok_or_else(|| CliError::invalid_argument("invalid context: no metadata found"))?;
    meta.name = name.to_string();
    store.create_or_update(&meta)?;
    store.reset_tls(name, &tls)?;
    tracing::info!(context = %name, "context imported");
    Ok(())
}
