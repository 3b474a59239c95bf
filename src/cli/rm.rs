//! `docker rm` and `docker rmi` command implementations

use super::{require_args, CliContext};
use crate::client::api::RemoveOptions;
use crate::CliError;
use clap::Args;
use std::io::Write;

/// Arguments for the `rm` command
#[derive(Args)]
pub struct RmArgs {
    /// Container names or IDs to remove
    pub containers: Vec<String>,

    /// Force the removal of a running container (uses SIGKILL)
    #[arg(short, long)]
    pub force: bool,

    /// Remove anonymous volumes associated with the container
    #[arg(short, long)]
    pub volumes: bool,

    /// Remove the specified link
    #[arg(short, long)]
    pub link: bool,
}

/// Arguments for the `rmi` command
#[derive(Args)]
pub struct RmiArgs {
    /// Image names or IDs to remove
    pub images: Vec<String>,

    /// Force removal of the image
    #[arg(short, long)]
    pub force: bool,

    /// Do not delete untagged parents
    #[arg(long)]
    pub no_prune: bool,
}

/// Execute the `rm` command
pub async fn execute(cli: &CliContext, args: RmArgs) -> anyhow::Result<()> {
    require_args("rm", args.containers.len(), 1)?;
    let client = cli.client().await?;
    let opts = RemoveOptions {
        force: args.force,
        volumes: args.volumes,
        link: args.link,
    };

    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for container in &args.containers {
        let name = container.trim_matches('/');
        if name.is_empty() {
            failures.push("Container name cannot be empty".to_string());
            continue;
        }
        match client.container_remove(name, &opts).await {
            Ok(()) => writeln!(out, "{}", container)?,
            // forced removal of something already gone is not an error
            Err(e) if args.force && e.is_not_found() => {}
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}

/// Execute the `rmi` command
pub async fn execute_rmi(cli: &CliContext, args: RmiArgs) -> anyhow::Result<()> {
    require_args("rmi", args.images.len(), 1)?;
    let client = cli.client().await?;

    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for image in &args.images {
        match client.image_remove(image, args.force, args.no_prune).await {
            Ok(items) => {
                for item in items {
                    if let Some(untagged) = item.untagged {
                        writeln!(out, "Untagged: {}", untagged)?;
                    }
                    if let Some(deleted) = item.deleted {
                        writeln!(out, "Deleted: {}", deleted)?;
                    }
                }
            }
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}
