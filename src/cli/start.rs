//! `docker start` command implementation

use super::exec::{forward_resizes, ResizeTarget};
use super::{require_args, CliContext};
use crate::client::api::AttachOptions;
use crate::hijack::escape::resolve_detach_keys;
use crate::hijack::{hold_session, HijackOptions, HijackOutcome};
use crate::CliError;
use clap::Args;
use std::io::Write;

/// Arguments for the `start` command
#[derive(Args)]
pub struct StartArgs {
    /// Container names or IDs to start
    pub containers: Vec<String>,

    /// Attach STDOUT/STDERR and forward signals
    #[arg(short, long)]
    pub attach: bool,

    /// Attach container's STDIN
    #[arg(short, long)]
    pub interactive: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,
}

/// Execute the `start` command
pub async fn execute(cli: &CliContext, args: StartArgs) -> anyhow::Result<()> {
    require_args("start", args.containers.len(), 1)?;
    if args.attach || args.interactive {
        if args.containers.len() > 1 {
            return Err(CliError::invalid_argument(
                "you cannot start and attach multiple containers at once",
            )
            .into());
        }
        return start_attached(cli, &args).await;
    }

    let client = cli.client().await?;
    let mut out = cli.streams.out.clone();
    let mut failures = Vec::new();
    for container in &args.containers {
        match client.container_start(container).await {
            Ok(()) => writeln!(out, "{}", container)?,
            Err(e) => failures.push(e.to_string()),
        }
    }
    if !failures.is_empty() {
        return Err(CliError::system(failures.join("\n")).into());
    }
    Ok(())
}

async fn start_attached(cli: &CliContext, args: &StartArgs) -> anyhow::Result<()> {
    let container = &args.containers[0];
    let client = cli.client().await?;
    let (state, _) = client.container_inspect_raw(container).await?;
    let tty = state["Config"]["Tty"].as_bool().unwrap_or(false);
    let attach_stdin = args.interactive && state["Config"]["OpenStdin"].as_bool().unwrap_or(false);

    let configured = cli.config.lock()?.detach_keys.clone();
    let raw_keys = args.detach_keys.clone().or(configured);
    let opts = AttachOptions {
        stream: true,
        stdin: attach_stdin,
        stdout: true,
        stderr: true,
        logs: false,
        detach_keys: raw_keys.clone(),
    };
    let conn = client.container_attach(container, &opts).await?;
    client.container_start(container).await?;

    let stop = cli.cancel.child_token();
    if tty {
        forward_resizes(cli, client.clone(), ResizeTarget::Container(container.clone()), &stop);
    }
    let hijack = HijackOptions {
        attach_stdin,
        attach_stdout: true,
        attach_stderr: true,
        tty,
        detach_keys: resolve_detach_keys(raw_keys.as_deref(), None),
    };
    let outcome = hold_session(conn, &cli.streams, &hijack, &cli.cancel).await;
    stop.cancel();
    if outcome? == HijackOutcome::Detached {
        return Ok(());
    }

    let waited = client.container_wait(container, "not-running").await?;
    if waited.status_code != 0 {
        return Err(CliError::Status {
            message: String::new(),
            code: waited.status_code as i32,
        }
        .into());
    }
    Ok(())
}
