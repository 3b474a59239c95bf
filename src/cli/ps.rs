//! `docker ps` command implementation

use super::CliContext;
use crate::client::api::ContainerListOptions;
use crate::formatter::container::{ContainerRecord, SIZE_TABLE};
use crate::formatter::{Format, FormatContext};
use crate::opts::filters::parse_filter_flag;
use crate::opts::Filters;
use clap::Args;

/// Arguments for the `ps` command
#[derive(Args)]
pub struct PsArgs {
    /// Show all containers (default shows just running)
    #[arg(short, long)]
    pub all: bool,

    /// Filter output based on conditions provided
    #[arg(short, long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Format output using a custom template
    #[arg(long)]
    pub format: Option<String>,

    /// Show n last created containers (includes all states)
    #[arg(short = 'n', long)]
    pub last: Option<usize>,

    /// Show the latest created container (includes all states)
    #[arg(short, long)]
    pub latest: bool,

    /// Don't truncate output
    #[arg(long)]
    pub no_trunc: bool,

    /// Only display container IDs
    #[arg(short, long)]
    pub quiet: bool,

    /// Display total file sizes
    #[arg(short, long)]
    pub size: bool,
}

const FILTERS: &[&str] = &[
    "ancestor", "before", "expose", "exited", "health", "id", "isolation", "is-task", "label",
    "name", "network", "publish", "since", "status", "volume",
];

/// Execute the `ps` command
pub async fn execute(cli: &CliContext, args: PsArgs) -> anyhow::Result<()> {
    let filters = Filters::from_flags(&args.filter)?;
    filters.validate(FILTERS)?;

    let limit = if args.latest { Some(1) } else { args.last };
    let opts = ContainerListOptions {
        all: args.all || limit.is_some(),
        limit,
        size: args.size,
        filters,
    };
    let containers = cli.client().await?.container_list(&opts).await?;

    let configured = cli.config.lock()?.ps_format.clone();
    let mut format = Format::resolve(args.format.as_deref(), configured.as_deref());
    if args.size && format == Format::Table(None) && !args.quiet {
        format = Format::parse(SIZE_TABLE);
    }

    let records: Vec<ContainerRecord> = containers.iter().map(ContainerRecord).collect();
    let mut ctx = FormatContext::new(cli.streams.out.clone(), format).quiet(args.quiet);
    // ids are shortened for every format, not only tables
    ctx.trunc = !args.no_trunc;
    ctx.write(&records)?;
    Ok(())
}
