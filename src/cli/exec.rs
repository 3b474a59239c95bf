//! `docker exec` and `docker attach` command implementations

use super::CliContext;
use crate::client::api::{AttachOptions, DaemonApi, ExecConfig};
use crate::hijack::escape::resolve_detach_keys;
use crate::hijack::{hold_session, HijackOptions, HijackOutcome};
use crate::opts::keyvalue::expand_env;
use crate::CliError;
use clap::Args;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Arguments for the `exec` command
#[derive(Args)]
pub struct ExecArgs {
    /// Container name or ID
    pub container: String,

    /// Command to execute
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Detached mode: run command in the background
    #[arg(short, long)]
    pub detach: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,

    /// Set environment variables
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Keep STDIN open even if not attached
    #[arg(short, long)]
    pub interactive: bool,

    /// Give extended privileges to the command
    #[arg(long)]
    pub privileged: bool,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Username or UID (format: "<name|uid>[:<group|gid>]")
    #[arg(short, long)]
    pub user: Option<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,
}

/// Arguments for the `attach` command
#[derive(Args)]
pub struct AttachArgs {
    /// Container name or ID
    pub container: String,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,

    /// Do not attach STDIN
    #[arg(long)]
    pub no_stdin: bool,
}

/// Which remote TTY a resize applies to
#[derive(Clone)]
pub(crate) enum ResizeTarget {
    Container(String),
    Exec(String),
}

/// Keep the remote TTY sized to the local terminal until `stop` fires.
#[cfg(unix)]
pub(crate) fn forward_resizes(cli: &CliContext, client: Arc<dyn DaemonApi>, target: ResizeTarget, stop: &CancellationToken) {
    if !cli.streams.out.is_terminal() {
        return;
    }
    let mut sizes = crate::streams::term::monitor_tty(stop.clone());
    tokio::spawn(async move {
        while let Some(size) = sizes.recv().await {
            let result = match &target {
                ResizeTarget::Container(id) => client.container_resize(id, size).await,
                ResizeTarget::Exec(id) => client.exec_resize(id, size).await,
            };
            if let Err(e) = result {
                tracing::debug!("error resizing tty: {}", e);
            }
        }
    });
}

#[cfg(not(unix))]
pub(crate) fn forward_resizes(_cli: &CliContext, _client: Arc<dyn DaemonApi>, _target: ResizeTarget, _stop: &CancellationToken) {}

fn detach_keys(cli: &CliContext, flag: Option<&str>) -> crate::Result<(Vec<u8>, Option<String>)> {
    let configured = cli.config.lock()?.detach_keys.clone();
    let keys = resolve_detach_keys(flag, configured.as_deref());
    Ok((keys, flag.map(str::to_string).or(configured)))
}

/// Execute the `exec` command
pub async fn execute(cli: &CliContext, args: ExecArgs) -> anyhow::Result<()> {
    let client = cli.client().await?;
    let (keys, raw_keys) = detach_keys(cli, args.detach_keys.as_deref())?;

    let attach_stdin = args.interactive && !args.detach;
    let config = ExecConfig {
        attach_stdin,
        attach_stdout: !args.detach,
        attach_stderr: !args.detach,
        tty: args.tty,
        cmd: args.command,
        env: expand_env(&args.env, |k| std::env::var(k).ok())?,
        user: args.user,
        working_dir: args.workdir,
        privileged: args.privileged,
        detach_keys: raw_keys,
    };
    let created = client.exec_create(&args.container, &config).await?;
    if created.id.is_empty() {
        return Err(CliError::system("exec ID empty").into());
    }

    if args.detach {
        client.exec_start_detached(&created.id, args.tty).await?;
        return Ok(());
    }

    let conn = client.exec_attach(&created.id, args.tty).await?;
    let stop = cli.cancel.child_token();
    if args.tty {
        forward_resizes(cli, client.clone(), ResizeTarget::Exec(created.id.clone()), &stop);
    }
    let opts = HijackOptions {
        attach_stdin,
        attach_stdout: true,
        attach_stderr: true,
        tty: args.tty,
        detach_keys: keys,
    };
    let outcome = hold_session(conn, &cli.streams, &opts, &cli.cancel).await;
    stop.cancel();
    if outcome? == HijackOutcome::Detached {
        return Ok(());
    }

    let inspected = client.exec_inspect(&created.id).await?;
    match inspected.exit_code {
        Some(0) | None => Ok(()),
        Some(code) => Err(CliError::Status {
            message: String::new(),
            code: code as i32,
        }
        .into()),
    }
}

/// Execute the `attach` command
pub async fn execute_attach(cli: &CliContext, args: AttachArgs) -> anyhow::Result<()> {
    let client = cli.client().await?;
    let (state, _) = client.container_inspect_raw(&args.container).await?;
    if state["State"]["Running"].as_bool() != Some(true) {
        return Err(CliError::Conflict("You cannot attach to a stopped container, start it first".into()).into());
    }
    if state["State"]["Paused"].as_bool() == Some(true) {
        return Err(CliError::Conflict("You cannot attach to a paused container, unpause it first".into()).into());
    }
    let tty = state["Config"]["Tty"].as_bool().unwrap_or(false);
    let open_stdin = state["Config"]["OpenStdin"].as_bool().unwrap_or(false);
    let (keys, raw_keys) = detach_keys(cli, args.detach_keys.as_deref())?;

    let attach_stdin = !args.no_stdin && open_stdin;
    let opts = AttachOptions {
        stream: true,
        stdin: attach_stdin,
        stdout: true,
        stderr: true,
        logs: false,
        detach_keys: raw_keys,
    };
    let conn = client.container_attach(&args.container, &opts).await?;

    let stop = cli.cancel.child_token();
    if tty {
        forward_resizes(cli, client.clone(), ResizeTarget::Container(args.container.clone()), &stop);
    }
    let hijack = HijackOptions {
        attach_stdin,
        attach_stdout: true,
        attach_stderr: true,
        tty,
        detach_keys: keys,
    };
    let outcome = hold_session(conn, &cli.streams, &hijack, &cli.cancel).await;
    stop.cancel();
    if outcome? == HijackOutcome::Detached {
        return Ok(());
    }

    let waited = client.container_wait(&args.container, "not-running").await?;
    if let Some(error) = waited.error.filter(|e| !e.message.is_empty()) {
        return Err(CliError::system(error.message).into());
    }
    if waited.status_code != 0 {
        return Err(CliError::Status {
            message: String::new(),
            code: waited.status_code as i32,
        }
        .into());
    }
    Ok(())
}
