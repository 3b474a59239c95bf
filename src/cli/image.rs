//! `docker image` command group

use super::images::{self, ImagesArgs};
use super::pull::{self, PullArgs};
use super::push::{self, PushArgs};
use super::rm::{self, RmiArgs};
use super::tag::{self, TagArgs};
use super::{prune_content, require_args, CliContext};
use crate::inspect::inspect;
use crate::opts::filters::parse_filter_flag;
use crate::prune;
use clap::{Args, Subcommand};

/// Arguments for the `image` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct ImageArgs {
    #[command(subcommand)]
    pub command: ImageCommands,
}

/// Image subcommands
#[derive(Subcommand)]
pub enum ImageCommands {
    /// List images
    #[command(visible_alias = "list")]
    Ls(ImagesArgs),
    /// Display detailed information on one or more images
    Inspect(ImageInspectArgs),
    /// Download an image from a registry
    Pull(PullArgs),
    /// Upload an image to a registry
    Push(PushArgs),
    /// Create a tag TARGET_IMAGE that refers to SOURCE_IMAGE
    Tag(TagArgs),
    /// Remove one or more images
    #[command(visible_alias = "remove")]
    Rm(RmiArgs),
    /// Remove unused images
    Prune(ImagePruneArgs),
}

/// Arguments for image inspect
#[derive(Args)]
pub struct ImageInspectArgs {
    /// Images to inspect
    pub images: Vec<String>,

    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for image prune
#[derive(Args)]
pub struct ImagePruneArgs {
    /// Remove all unused images, not just dangling ones
    #[arg(short, long)]
    pub all: bool,

    /// Provide filter values (e.g. "until=<timestamp>")
    #[arg(long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,
}

/// Execute the `image` command
pub async fn execute(cli: &CliContext, args: ImageArgs) -> anyhow::Result<()> {
    match args.command {
        ImageCommands::Ls(args) => images::execute(cli, args).await,
        ImageCommands::Inspect(args) => {
            require_args("image inspect", args.images.len(), 1)?;
            let client = cli.client().await?;
            let mut out = cli.streams.out.clone();
            inspect(
                &mut out,
                &args.images,
                args.format.as_deref().unwrap_or_default(),
                |name| {
                    let client = client.clone();
                    async move { client.image_inspect_raw(&name).await }
                },
            )
            .await?;
            Ok(())
        }
        ImageCommands::Pull(args) => pull::execute(cli, args).await,
        ImageCommands::Push(args) => push::execute(cli, args).await,
        ImageCommands::Tag(args) => tag::execute(cli, args).await,
        ImageCommands::Rm(args) => rm::execute_rmi(cli, args).await,
        ImageCommands::Prune(args) => {
            prune_content(cli, prune::IMAGE, args.force, args.all, &args.filter).await
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use crate::client::api::PruneReport;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inspect_template() {
        let dir = TempDir::new().unwrap();
        let daemon = FakeDaemon::new("1.45")
            .with_object("alpine", json!({"Id": "sha256:abc", "Os": "linux"}));
        let (code, out, _) = run_against(
            Arc::new(daemon),
            &dir,
            &["image", "inspect", "-f", "{{.Os}}", "alpine"],
        )
        .await;
        assert_eq!(code, 0);
        assert_eq!(out, "linux\n");
    }

    #[tokio::test]
    async fn test_prune_forced_reports_space() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.45");
        daemon.prune = PruneReport {
            deleted: vec!["sha256:1111".into()],
            space_reclaimed: 1000,
        };
        let daemon = Arc::new(daemon);
        let (code, out, _) = run_against(daemon.clone(), &dir, &["image", "prune", "-f"]).await;
        assert_eq!(code, 0);
        assert!(out.contains("sha256:1111"), "{}", out);
        assert!(out.ends_with("Total reclaimed space: 1kB\n"), "{}", out);
        assert_eq!(daemon.calls(), vec!["image prune"]);
    }
}
