//! `docker container` command group

use super::exec::{self, AttachArgs, ExecArgs};
use super::logs::{self, LogsArgs};
use super::ps::{self, PsArgs};
use super::rm::{self, RmArgs};
use super::run::{self, RunArgs};
use super::start::{self, StartArgs};
use super::stop::{self, StopArgs};
use super::{prune_content, require_args, CliContext};
use crate::inspect::inspect;
use crate::opts::filters::parse_filter_flag;
use crate::prune;
use clap::{Args, Subcommand};

/// Arguments for the `container` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct ContainerArgs {
    #[command(subcommand)]
    pub command: ContainerCommands,
}

/// Container subcommands
#[derive(Subcommand)]
pub enum ContainerCommands {
    /// List containers
    #[command(visible_aliases = ["list", "ps"])]
    Ls(PsArgs),
    /// Display detailed information on one or more containers
    Inspect(ContainerInspectArgs),
    /// Attach local standard input, output, and error streams to a running container
    Attach(AttachArgs),
    /// Create and run a new container from an image
    Run(RunArgs),
    /// Execute a command in a running container
    Exec(ExecArgs),
    /// Fetch the logs of a container
    Logs(LogsArgs),
    /// Start one or more stopped containers
    Start(StartArgs),
    /// Stop one or more running containers
    Stop(StopArgs),
    /// Remove one or more containers
    #[command(visible_alias = "remove")]
    Rm(RmArgs),
    /// Remove all stopped containers
    Prune(ContainerPruneArgs),
}

/// Arguments for container inspect
#[derive(Args)]
pub struct ContainerInspectArgs {
    /// Containers to inspect
    pub containers: Vec<String>,

    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for container prune
#[derive(Args)]
pub struct ContainerPruneArgs {
    /// Provide filter values (e.g. "until=<timestamp>")
    #[arg(long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Execute the `container` command
pub async fn execute(cli: &CliContext, args: ContainerArgs) -> anyhow::Result<()> {
    match args.command {
        ContainerCommands::Ls(args) => ps::execute(cli, args).await,
        ContainerCommands::Inspect(args) => {
            require_args("container inspect", args.containers.len(), 1)?;
            let client = cli.client().await?;
            let mut out = cli.streams.out.clone();
            inspect(
                &mut out,
                &args.containers,
                args.format.as_deref().unwrap_or_default(),
                |name| {
                    let client = client.clone();
                    async move { client.container_inspect_raw(&name).await }
                },
            )
            .await?;
            Ok(())
        }
        ContainerCommands::Attach(args) => exec::execute_attach(cli, args).await,
        ContainerCommands::Run(args) => run::execute(cli, args).await,
        ContainerCommands::Exec(args) => exec::execute(cli, args).await,
        ContainerCommands::Logs(args) => logs::execute(cli, args).await,
        ContainerCommands::Start(args) => start::execute(cli, args).await,
        ContainerCommands::Stop(args) => stop::execute(cli, args).await,
        ContainerCommands::Rm(args) => rm::execute(cli, args).await,
        ContainerCommands::Prune(args) => {
            prune_content(cli, prune::CONTAINER, args.force, false, &args.filter).await
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inspect_missing_among_found() {
        let dir = TempDir::new().unwrap();
        let daemon = FakeDaemon::new("1.45").with_object("web", json!({"Name": "/web"}));
        let (code, out, err) = run_against(
            Arc::new(daemon),
            &dir,
            &["container", "inspect", "--format", "{{.Name}}", "web", "ghost"],
        )
        .await;
        assert_eq!(code, 1);
        assert_eq!(out, "/web\n");
        assert!(err.contains("No such object: ghost"), "{}", err);
    }

    #[tokio::test]
    async fn test_prune_declined_on_eof() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, out, _) = run_against(daemon.clone(), &dir, &["container", "prune"]).await;
        assert_eq!(code, 0);
        assert!(out.contains("WARNING! This will remove all stopped containers."), "{}", out);
        assert!(out.ends_with('\n'));
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_group_without_subcommand_shows_help() {
        let dir = TempDir::new().unwrap();
        let (code, out, _) =
            run_against(Arc::new(FakeDaemon::new("1.45")), &dir, &["container"]).await;
        assert_eq!(code, 0);
        assert!(out.contains("Usage:"), "{}", out);
    }
}
