//! `docker network` command implementation

use super::{prune_content, require_args, CliContext};
use crate::client::api::NetworkCreateOptions;
use crate::formatter::network::NetworkRecord;
use crate::formatter::{Format, FormatContext};
use crate::inspect::inspect;
use crate::opts::filters::parse_filter_flag;
use crate::opts::keyvalue::{key_value_flag, parse_key_value, parse_label, to_map};
use crate::opts::Filters;
use crate::prune;
use crate::CliError;
use clap::{Args, Subcommand};
use std::io::Write;

/// Arguments for the `network` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct NetworkArgs {
    #[command(subcommand)]
    pub command: NetworkCommands,
}

/// Network subcommands
#[derive(Subcommand)]
pub enum NetworkCommands {
    /// Create a network
    Create(NetworkCreateArgs),
    /// List networks
    #[command(visible_alias = "list")]
    Ls(NetworkLsArgs),
    /// Remove one or more networks
    #[command(visible_alias = "remove")]
    Rm(NetworkRmArgs),
    /// Display detailed information on one or more networks
    Inspect(NetworkInspectArgs),
    /// Remove all unused networks
    Prune(NetworkPruneArgs),
}

/// Arguments for network create
#[derive(Args)]
pub struct NetworkCreateArgs {
    /// Network name
    pub name: String,

    /// Driver to manage the Network
    #[arg(short, long, default_value = "bridge")]
    pub driver: String,

    /// Set driver specific options
    #[arg(short, long, value_parser = key_value_flag)]
    pub opt: Vec<String>,

    /// Set metadata on a network
    #[arg(long)]
    pub label: Vec<String>,

    /// Restrict external access to the network
    #[arg(long)]
    pub internal: bool,

    /// Enable manual container attachment
    #[arg(long)]
    pub attachable: bool,

    /// Enable or disable IPv6 networking
    #[arg(long)]
    pub ipv6: bool,
}

/// Arguments for network ls
#[derive(Args)]
pub struct NetworkLsArgs {
    /// Provide filter values (e.g. "driver=bridge")
    #[arg(short, long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Format output using a custom template
    #[arg(long)]
    pub format: Option<String>,

    /// Do not truncate the output
    #[arg(long)]
    pub no_trunc: bool,

    /// Only display network IDs
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for network rm
#[derive(Args)]
pub struct NetworkRmArgs {
    /// Networks to remove
    pub networks: Vec<String>,

    /// Do not error if the network does not exist
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for network inspect
#[derive(Args)]
pub struct NetworkInspectArgs {
    /// Networks to inspect
    pub networks: Vec<String>,

    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for network prune
#[derive(Args)]
pub struct NetworkPruneArgs {
    /// Provide filter values (e.g. "until=<timestamp>")
    #[arg(long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

const LS_FILTERS: &[&str] = &["dangling", "driver", "id", "label", "name", "scope", "type"];

/// Execute the `network` command
pub async fn execute(cli: &CliContext, args: NetworkArgs) -> anyhow::Result<()> {
    match args.command {
        NetworkCommands::Create(args) => create(cli, args).await,
        NetworkCommands::Ls(args) => list(cli, args).await,
        NetworkCommands::Rm(args) => remove(cli, args).await,
        NetworkCommands::Inspect(args) => {
            require_args("network inspect", args.networks.len(), 1)?;
            let client = cli.client().await?;
            let mut out = cli.streams.out.clone();
            inspect(
                &mut out,
                &args.networks,
                args.format.as_deref().unwrap_or_default(),
                |name| {
                    let client = client.clone();
                    async move { client.network_inspect_raw(&name).await }
                },
            )
            .await?;
            Ok(())
        }
        NetworkCommands::Prune(args) => {
            prune_content(cli, prune::NETWORK, args.force, false, &args.filter).await
        }
    }
}

async fn create(cli: &CliContext, args: NetworkCreateArgs) -> anyhow::Result<()> {
    let opts = NetworkCreateOptions {
        name: args.name,
        driver: args.driver,
        internal: args.internal,
        attachable: args.attachable,
        enable_ipv6: args.ipv6,
        options: to_map(&args.opt, parse_key_value)?,
        labels: to_map(&args.label, parse_label)?,
    };
    let created = cli.client().await?.network_create(&opts).await?;
    if !created.warning.is_empty() {
        let mut err = cli.streams.err.clone();
        writeln!(err, "WARNING: {}", created.warning)?;
    }
    let mut out = cli.streams.out.clone();
    writeln!(out, "{}", created.id)?;
    Ok(())
}

async fn list(cli: &CliContext, args: NetworkLsArgs) -> anyhow::Result<()> {
    let filters = Filters::from_flags(&args.filter)?;
    filters.validate(LS_FILTERS)?;

    let mut networks = cli.client().await?.network_list(&filters).await?;
    networks.sort_by(|a, b| a.name.cmp(&b.name));

    let configured = cli.config.lock()?.networks_format.clone();
    let format = Format::resolve(args.format.as_deref(), configured.as_deref());
    let records: Vec<NetworkRecord> = networks.iter().map(NetworkRecord).collect();
    FormatContext::new(cli.streams.out.clone(), format)
        .quiet(args.quiet)
        .no_trunc(args.no_trunc)
        .write(&records)?;
    Ok(())
}

async fn remove(cli: &CliContext, args: NetworkRmArgs) -> anyhow::Result<()> {
    require_args("network rm", args.networks.len(), 1)?;
    let client = cli.client().await?;
    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for name in &args.networks {
        match client.network_remove(name).await {
            Ok(()) => writeln!(out, "{}", name)?,
            Err(e) if args.force && e.is_not_found() => {
                tracing::debug!("ignoring missing network {}", name);
            }
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}
