//! `docker builder` command implementation

use super::{prune_content, CliContext};
use crate::opts::filters::parse_filter_flag;
use crate::prune;
use clap::{Args, Subcommand};

/// Arguments for the `builder` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct BuilderArgs {
    #[command(subcommand)]
    pub command: BuilderCommands,
}

/// Builder subcommands
#[derive(Subcommand)]
pub enum BuilderCommands {
    /// Remove build cache
    Prune(BuilderPruneArgs),
}

/// Arguments for builder prune
#[derive(Args)]
pub struct BuilderPruneArgs {
    /// Remove all unused build cache, not just dangling ones
    #[arg(short, long)]
    pub all: bool,

    /// Provide filter values (e.g. "until=24h")
    #[arg(long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Execute the `builder` command
pub async fn execute(cli: &CliContext, args: BuilderArgs) -> anyhow::Result<()> {
    match args.command {
        BuilderCommands::Prune(args) => {
            prune_content(cli, prune::BUILD_CACHE, args.force, args.all, &args.filter).await
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prune_all() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, out, _) =
            run_against(daemon.clone(), &dir, &["builder", "prune", "-a", "-f"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "Total reclaimed space: 0B\n");
        assert_eq!(daemon.calls(), vec!["builder prune all=true"]);
    }

    #[tokio::test]
    async fn test_gated_below_1_31() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.30"));
        let (code, _, err) = run_against(daemon.clone(), &dir, &["builder", "prune", "-f"]).await;
        assert_eq!(code, 1);
        assert!(err.contains("docker builder prune requires API version 1.31"), "{}", err);
        assert!(daemon.calls().is_empty());
    }
}
