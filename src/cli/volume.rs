//! `docker volume` command implementation

use super::{prune_content, require_args, CliContext};
use crate::client::api::{Volume, VolumeCreateOptions};
use crate::formatter::volume::VolumeRecord;
use crate::formatter::{Format, FormatContext};
use crate::inspect::inspect;
use crate::opts::filters::parse_filter_flag;
use crate::opts::keyvalue::{key_value_flag, parse_key_value, parse_label, to_map};
use crate::opts::Filters;
use crate::prune;
use crate::CliError;
use clap::{Args, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Write;

/// Arguments for the `volume` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct VolumeArgs {
    #[command(subcommand)]
    pub command: VolumeCommands,
}

/// Volume subcommands
#[derive(Subcommand)]
pub enum VolumeCommands {
    /// Create a volume
    Create(VolumeCreateArgs),
    /// List volumes
    #[command(visible_alias = "list")]
    Ls(VolumeLsArgs),
    /// Remove one or more volumes
    #[command(visible_alias = "remove")]
    Rm(VolumeRmArgs),
    /// Display detailed information on one or more volumes
    Inspect(VolumeInspectArgs),
    /// Remove unused local volumes
    Prune(VolumePruneArgs),
    /// Update a volume (cluster volumes only)
    Update(VolumeUpdateArgs),
}

/// Arguments for volume create
#[derive(Args)]
pub struct VolumeCreateArgs {
    /// Volume name
    pub name: Option<String>,

    /// Specify volume driver name
    #[arg(short, long, default_value = "local")]
    pub driver: String,

    /// Set driver specific options
    #[arg(short, long, value_parser = key_value_flag)]
    pub opt: Vec<String>,

    /// Set metadata for a volume
    #[arg(long)]
    pub label: Vec<String>,
}

/// Arguments for volume ls
#[derive(Args)]
pub struct VolumeLsArgs {
    /// Provide filter values (e.g. "dangling=true")
    #[arg(short, long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Format output using a custom template
    #[arg(long)]
    pub format: Option<String>,

    /// Only display volume names
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for volume rm
#[derive(Args)]
pub struct VolumeRmArgs {
    /// Volume names to remove
    pub volumes: Vec<String>,

    /// Force the removal of one or more volumes
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for volume inspect
#[derive(Args)]
pub struct VolumeInspectArgs {
    /// Volume names to inspect
    pub volumes: Vec<String>,

    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for volume prune
#[derive(Args)]
pub struct VolumePruneArgs {
    /// Remove all unused volumes, not just anonymous ones
    #[arg(short, long)]
    pub all: bool,

    /// Provide filter values (e.g. "label=<label>")
    #[arg(long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Availability {
    Active,
    Pause,
    Drain,
}

impl Availability {
    fn as_str(self) -> &'static str {
        match self {
            Availability::Active => "active",
            Availability::Pause => "pause",
            Availability::Drain => "drain",
        }
    }
}

/// Arguments for volume update
#[derive(Args)]
pub struct VolumeUpdateArgs {
    /// Volume name
    pub name: String,

    /// Cluster volume availability
    #[arg(long, value_enum, default_value = "active")]
    pub availability: Availability,
}

const LS_FILTERS: &[&str] = &["dangling", "driver", "label", "name"];

/// Execute the `volume` command
pub async fn execute(cli: &CliContext, args: VolumeArgs) -> anyhow::Result<()> {
    match args.command {
        VolumeCommands::Create(args) => create(cli, args).await,
        VolumeCommands::Ls(args) => list(cli, args).await,
        VolumeCommands::Rm(args) => remove(cli, args).await,
        VolumeCommands::Inspect(args) => inspect_volumes(cli, args).await,
        VolumeCommands::Prune(args) => {
            prune_content(cli, prune::VOLUME, args.force, args.all, &args.filter).await
        }
        VolumeCommands::Update(args) => update(cli, args).await,
    }
}

async fn create(cli: &CliContext, args: VolumeCreateArgs) -> anyhow::Result<()> {
    let opts = VolumeCreateOptions {
        name: args.name.unwrap_or_default(),
        driver: args.driver,
        driver_opts: to_map(&args.opt, parse_key_value)?,
        labels: to_map(&args.label, parse_label)?,
    };
    let volume = cli.client().await?.volume_create(&opts).await?;
    let mut out = cli.streams.out.clone();
    writeln!(out, "{}", volume.name)?;
    Ok(())
}

async fn list(cli: &CliContext, args: VolumeLsArgs) -> anyhow::Result<()> {
    let filters = Filters::from_flags(&args.filter)?;
    filters.validate(LS_FILTERS)?;

    let list = cli.client().await?.volume_list(&filters).await?;
    let mut volumes = list.volumes;
    volumes.sort_by(|a, b| a.name.cmp(&b.name));
    for warning in &list.warnings {
        let mut err = cli.streams.err.clone();
        writeln!(err, "WARNING: {}", warning)?;
    }

    let configured = cli.config.lock()?.volumes_format.clone();
    let format = Format::resolve(args.format.as_deref(), configured.as_deref());
    let records: Vec<VolumeRecord> = volumes.iter().map(VolumeRecord).collect();
    FormatContext::new(cli.streams.out.clone(), format)
        .quiet(args.quiet)
        .write(&records)?;
    Ok(())
}

async fn remove(cli: &CliContext, args: VolumeRmArgs) -> anyhow::Result<()> {
    require_args("volume rm", args.volumes.len(), 1)?;
    let client = cli.client().await?;
    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for name in &args.volumes {
        match client.volume_remove(name, args.force).await {
            Ok(()) => writeln!(out, "{}", name)?,
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}

async fn inspect_volumes(cli: &CliContext, args: VolumeInspectArgs) -> anyhow::Result<()> {
    require_args("volume inspect", args.volumes.len(), 1)?;
    let client = cli.client().await?;
    let mut out = cli.streams.out.clone();
    inspect(
        &mut out,
        &args.volumes,
        args.format.as_deref().unwrap_or_default(),
        |name| {
            let client = client.clone();
            async move { client.volume_inspect_raw(&name).await }
        },
    )
    .await?;
    Ok(())
}

async fn update(cli: &CliContext, args: VolumeUpdateArgs) -> anyhow::Result<()> {
    let client = cli.client().await?;
    let (value, _) = client.volume_inspect_raw(&args.name).await?;
    let volume: Volume = serde_json::from_value(value)?;
    let Some(cluster) = volume.cluster_volume else {
        return Err(CliError::invalid_argument("Can only update cluster volumes").into());
    };

    let mut spec = cluster.spec;
    if !spec.is_object() {
        spec = Value::Object(Default::default());
    }
    spec["Availability"] = Value::String(args.availability.as_str().to_string());
    client
        .volume_update(&args.name, cluster.version.index, &spec)
        .await?;
    Ok(())
}
