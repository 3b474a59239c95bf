//! `docker stop` command implementation

use super::{require_args, CliContext};
use crate::CliError;
use clap::Args;
use std::io::Write;

/// Arguments for the `stop` command
#[derive(Args)]
pub struct StopArgs {
    /// Container names or IDs to stop
    pub containers: Vec<String>,

    /// Seconds to wait before killing the container
    #[arg(short = 't', long = "time", alias = "timeout")]
    pub time: Option<i64>,
}

/// Execute the `stop` command
pub async fn execute(cli: &CliContext, args: StopArgs) -> anyhow::Result<()> {
    require_args("stop", args.containers.len(), 1)?;
    let client = cli.client().await?;
    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for container in &args.containers {
        match client.container_stop(container, args.time).await {
            Ok(()) => writeln!(out, "{}", container)?,
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}
