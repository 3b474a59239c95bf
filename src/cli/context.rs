//! `docker context` command implementation

use super::{require_args, CliContext};
use crate::config::paths::DOCKER_ENDPOINT;
use crate::context::export::{export_context, import_context};
use crate::context::{
    validate_context_name, ContextStore, EndpointMeta, EndpointTlsData, Metadata, TlsPolicy,
    CA_FILE, CERT_FILE, DEFAULT_CONTEXT_NAME, KEY_FILE,
};
use crate::context::default::HOST_ENV;
use crate::formatter::context::ContextRecord;
use crate::formatter::{Format, FormatContext};
use crate::inspect::inspect;
use crate::prompt::parse_bool_env;
use crate::{CliError, Result};
use clap::{Args, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tokio::io::AsyncReadExt;

/// Arguments for the `context` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub command: ContextCommands,
}

/// Context subcommands
#[derive(Subcommand)]
pub enum ContextCommands {
    /// Create a context
    Create(ContextCreateArgs),
    /// Export a context to a tar archive FILE or a tar stream on STDOUT
    Export(ContextExportArgs),
    /// Import a context from a tar archive
    Import(ContextImportArgs),
    /// Display detailed information on one or more contexts
    Inspect(ContextInspectArgs),
    /// List contexts
    #[command(visible_alias = "list")]
    Ls(ContextLsArgs),
    /// Remove one or more contexts
    #[command(visible_alias = "remove")]
    Rm(ContextRmArgs),
    /// Print the name of the current context
    Show,
    /// Update a context
    Update(ContextCreateArgs),
    /// Set the current docker context
    Use(ContextUseArgs),
}

/// Arguments for context create and update
#[derive(Args)]
pub struct ContextCreateArgs {
    /// Context name
    pub name: String,

    /// Description of the context
    #[arg(long)]
    pub description: Option<String>,

    /// Set the docker endpoint (host=,ca=,cert=,key=,skip-tls-verify=,from=)
    #[arg(long)]
    pub docker: Option<String>,

    /// Create context from a named context
    #[arg(long)]
    pub from: Option<String>,
}

/// Arguments for context export
#[derive(Args)]
pub struct ContextExportArgs {
    /// Context to export
    pub name: String,

    /// Destination file, or "-" for STDOUT
    pub file: Option<String>,
}

/// Arguments for context import
#[derive(Args)]
pub struct ContextImportArgs {
    /// Name for the imported context
    pub name: String,

    /// Source file, or "-" for STDIN
    pub file: String,
}

/// Arguments for context inspect
#[derive(Args)]
pub struct ContextInspectArgs {
    /// Contexts to inspect (defaults to the current one)
    pub names: Vec<String>,

    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for context ls
#[derive(Args)]
pub struct ContextLsArgs {
    /// Format output using a custom template
    #[arg(long)]
    pub format: Option<String>,

    /// Only show context names
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for context rm
#[derive(Args)]
pub struct ContextRmArgs {
    /// Contexts to remove
    pub names: Vec<String>,

    /// Force the removal of a context in use
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for context use
#[derive(Args)]
pub struct ContextUseArgs {
    /// Context to switch to
    pub name: String,
}

const DOCKER_KEYS: &[&str] = &["from", "host", "ca", "cert", "key", "skip-tls-verify"];

/// Split a `--docker` value into its keys.
fn parse_docker_spec(spec: &str) -> Result<BTreeMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(spec.as_bytes());
    let mut fields = BTreeMap::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| CliError::invalid_argument(format!("invalid docker endpoint: {}", e)))?;
        for field in record.iter().filter(|f| !f.is_empty()) {
            let (key, value) = field.split_once('=').ok_or_else(|| {
                CliError::invalid_argument(format!("invalid docker endpoint field: {}", field))
            })?;
            if !DOCKER_KEYS.contains(&key) {
                return Err(CliError::invalid_argument(format!(
                    "unrecognized config key: {}",
                    key
                )));
            }
            fields.insert(key.to_string(), value.to_string());
        }
    }
    Ok(fields)
}

/// A docker endpoint with the TLS files that go with it
#[derive(Debug, Default)]
struct EndpointSpec {
    meta: EndpointMeta,
    tls: EndpointTlsData,
}

fn copy_endpoint(store: &dyn ContextStore, name: &str) -> Result<EndpointSpec> {
    let meta = store
        .get_metadata(name)?
        .endpoints
        .get(DOCKER_ENDPOINT)
        .cloned()
        .unwrap_or_default();
    let mut tls = EndpointTlsData::default();
    if let Some(files) = store.list_tls_files(name)?.get(DOCKER_ENDPOINT) {
        for file in files {
            let data = store.get_tls_data(name, DOCKER_ENDPOINT, file)?;
            tls.files.insert(file.clone(), data);
        }
    }
    Ok(EndpointSpec { meta, tls })
}

fn endpoint_from_fields(
    store: &dyn ContextStore,
    fields: &BTreeMap<String, String>,
) -> Result<EndpointSpec> {
    if let Some(from) = fields.get("from") {
        return copy_endpoint(store, from);
    }

    let skip_tls_verify = match fields.get("skip-tls-verify") {
        Some(value) => parse_bool_env(Some(value.as_str())).ok_or_else(|| {
            CliError::invalid_argument(format!("invalid skip-tls-verify value: {}", value))
        })?,
        None => false,
    };

    let mut tls = EndpointTlsData::default();
    for (key, file) in [("ca", CA_FILE), ("cert", CERT_FILE), ("key", KEY_FILE)] {
        if let Some(path) = fields.get(key).filter(|p| !p.is_empty()) {
            let data = std::fs::read(path).map_err(|e| {
                CliError::invalid_argument(format!("unable to read {}: {}", path, e))
            })?;
            tls.files.insert(file.to_string(), data);
        }
    }

    let policy = match (tls.files.is_empty(), skip_tls_verify) {
        (true, false) => TlsPolicy::Off,
        (_, true) => TlsPolicy::On,
        (false, false) => TlsPolicy::Verify,
    };
    Ok(EndpointSpec {
        meta: EndpointMeta {
            host: fields.get("host").cloned().unwrap_or_default(),
            tls: policy,
            skip_tls_verify,
        },
        tls,
    })
}

/// Resolve `--docker`/`--from` into an endpoint; `None` when neither is set.
fn requested_endpoint(cli: &CliContext, args: &ContextCreateArgs) -> Result<Option<EndpointSpec>> {
    let store = cli.contexts.as_ref();
    match (&args.docker, &args.from) {
        (Some(spec), _) => endpoint_from_fields(store, &parse_docker_spec(spec)?).map(Some),
        (None, Some(from)) => copy_endpoint(store, from).map(Some),
        (None, None) => Ok(None),
    }
}

fn save(store: &dyn ContextStore, meta: &Metadata, tls: Option<&EndpointTlsData>) -> Result<()> {
    store.create_or_update(meta)?;
    if let Some(tls) = tls {
        store.reset_endpoint_tls(&meta.name, DOCKER_ENDPOINT, tls)?;
    }
    Ok(())
}

async fn create(cli: &CliContext, args: ContextCreateArgs) -> anyhow::Result<()> {
    validate_context_name(&args.name)?;
    let store = cli.contexts.as_ref();
    if store.exists(&args.name) {
        return Err(CliError::Conflict(format!("context {:?} already exists", args.name)).into());
    }

    let endpoint = match requested_endpoint(cli, &args)? {
        Some(endpoint) => endpoint,
        None => copy_endpoint(store, cli.current_context())?,
    };
    let mut meta = Metadata {
        name: args.name.clone(),
        ..Default::default()
    };
    meta.metadata.description = args.description.unwrap_or_default();
    meta.endpoints.insert(DOCKER_ENDPOINT.to_string(), endpoint.meta);
    let tls = Some(&endpoint.tls).filter(|t| !t.files.is_empty());
    save(store, &meta, tls)?;

    writeln!(cli.streams.out.clone(), "{}", args.name)?;
    writeln!(cli.streams.err.clone(), "Successfully created context {:?}", args.name)?;
    Ok(())
}

async fn update(cli: &CliContext, args: ContextCreateArgs) -> anyhow::Result<()> {
    let store = cli.contexts.as_ref();
    if args.name == DEFAULT_CONTEXT_NAME {
        return Err(CliError::invalid_argument("default context cannot be created nor updated").into());
    }
    let mut meta = store.get_metadata(&args.name)?;
    if let Some(description) = args.description.clone() {
        meta.metadata.description = description;
    }
    let endpoint = requested_endpoint(cli, &args)?;
    let tls = match endpoint {
        Some(endpoint) => {
            meta.endpoints.insert(DOCKER_ENDPOINT.to_string(), endpoint.meta);
            Some(endpoint.tls)
        }
        None => None,
    };
    save(store, &meta, tls.as_ref())?;

    writeln!(cli.streams.out.clone(), "{}", args.name)?;
    writeln!(cli.streams.err.clone(), "Successfully updated context {:?}", args.name)?;
    Ok(())
}

async fn list(cli: &CliContext, args: ContextLsArgs) -> anyhow::Result<()> {
    let mut contexts = cli.contexts.list()?;
    if let Some(rest) = contexts.get_mut(1..) {
        rest.sort_by(|a, b| a.name.cmp(&b.name));
    }
    let current = cli.current_context();
    let records: Vec<ContextRecord> = contexts
        .iter()
        .map(|meta| ContextRecord {
            meta,
            current: meta.name == current,
        })
        .collect();
    let format = Format::resolve(args.format.as_deref(), None);
    FormatContext::new(cli.streams.out.clone(), format)
        .quiet(args.quiet)
        .write(&records)?;
    Ok(())
}

fn inspect_value(store: &dyn ContextStore, name: &str) -> Result<(Value, Vec<u8>)> {
    let meta = store.get_metadata(name)?;
    let storage = store.storage_info(name);
    let mut value = serde_json::to_value(&meta)?;
    value["TLSMaterial"] = serde_json::to_value(store.list_tls_files(name)?)?;
    value["Storage"] = json!({
        "MetadataPath": storage.metadata_path,
        "TLSPath": storage.tls_path,
    });
    let raw = serde_json::to_vec(&value)?;
    Ok((value, raw))
}

async fn inspect_contexts(cli: &CliContext, args: ContextInspectArgs) -> anyhow::Result<()> {
    let names = if args.names.is_empty() {
        vec![cli.current_context().to_string()]
    } else {
        args.names
    };
    let store = cli.contexts.clone();
    let mut out = cli.streams.out.clone();
    inspect(
        &mut out,
        &names,
        args.format.as_deref().unwrap_or_default(),
        |name| {
            let store = store.clone();
            async move { inspect_value(store.as_ref(), &name) }
        },
    )
    .await?;
    Ok(())
}

async fn remove(cli: &CliContext, args: ContextRmArgs) -> anyhow::Result<()> {
    require_args("context rm", args.names.len(), 1)?;
    let store = cli.contexts.as_ref();
    let current = cli.current_context().to_string();
    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for name in &args.names {
        if name == DEFAULT_CONTEXT_NAME {
            failures.push("default context cannot be removed".to_string());
            continue;
        }
        if *name == current && !args.force {
            failures.push(format!(
                "context {:?} is in use, set -f flag to force remove",
                name
            ));
            continue;
        }
        if !store.exists(name) {
            if !args.force {
                failures.push(format!("context {:?} does not exist", name));
            }
            continue;
        }
        if *name == current {
            cli.config.update(|config| {
                config.current_context = None;
                Ok(())
            })?;
        }
        match store.remove(name) {
            Ok(()) => writeln!(out, "{}", name)?,
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}

async fn use_context(cli: &CliContext, args: ContextUseArgs) -> anyhow::Result<()> {
    if args.name != DEFAULT_CONTEXT_NAME {
        validate_context_name(&args.name)?;
        cli.contexts.get_metadata(&args.name)?;
    }
    let selected = Some(args.name.clone()).filter(|n| n != DEFAULT_CONTEXT_NAME);
    cli.config.update(|config| {
        config.current_context = selected;
        Ok(())
    })?;

    writeln!(cli.streams.out.clone(), "{}", args.name)?;
    let mut err = cli.streams.err.clone();
    writeln!(err, "Current context is now {:?}", args.name)?;
    if args.name != DEFAULT_CONTEXT_NAME && std::env::var_os(HOST_ENV).is_some() {
        writeln!(
            err,
            "Warning: {} environment variable overrides the active context. To use {:?}, either set the global --context flag, or unset {} environment variable.",
            HOST_ENV, args.name, HOST_ENV
        )?;
    }
    Ok(())
}

async fn export(cli: &CliContext, args: ContextExportArgs) -> anyhow::Result<()> {
    let store = cli.contexts.as_ref();
    let file = args
        .file
        .unwrap_or_else(|| format!("{}.dockercontext", args.name));
    if file == "-" {
        if cli.streams.out.is_terminal() {
            return Err(CliError::invalid_argument(
                "cowardly refusing to export to a terminal, specify a file path",
            )
            .into());
        }
        export_context(store, &args.name, cli.streams.out.clone())?;
        return Ok(());
    }

    let writer = std::fs::File::create(&file)?;
    export_context(store, &args.name, writer)?;
    writeln!(cli.streams.err.clone(), "Written file {:?}", file)?;
    Ok(())
}

async fn import(cli: &CliContext, args: ContextImportArgs) -> anyhow::Result<()> {
    let store = cli.contexts.as_ref();
    if args.file == "-" {
        let mut data = Vec::new();
        cli.streams.input.lock().await.read_to_end(&mut data).await?;
        import_context(store, &args.name, Cursor::new(data))?;
    } else {
        let reader = std::fs::File::open(&args.file)?;
        import_context(store, &args.name, reader)?;
    }
    writeln!(cli.streams.out.clone(), "{}", args.name)?;
    writeln!(cli.streams.err.clone(), "Successfully imported context {:?}", args.name)?;
    Ok(())
}

/// Execute the `context` command
pub async fn execute(cli: &CliContext, args: ContextArgs) -> anyhow::Result<()> {
    match args.command {
        ContextCommands::Create(args) => create(cli, args).await,
        ContextCommands::Export(args) => export(cli, args).await,
        ContextCommands::Import(args) => import(cli, args).await,
        ContextCommands::Inspect(args) => inspect_contexts(cli, args).await,
        ContextCommands::Ls(args) => list(cli, args).await,
        ContextCommands::Rm(args) => remove(cli, args).await,
        ContextCommands::Show => {
            writeln!(cli.streams.out.clone(), "{}", cli.current_context())?;
            Ok(())
        }
        ContextCommands::Update(args) => update(cli, args).await,
        ContextCommands::Use(args) => use_context(cli, args).await,
    }
}
