//! `docker run` command implementation

use super::exec::{forward_resizes, ResizeTarget};
use super::pull::{pull_image, DEFAULT_PLATFORM_ENV};
use super::CliContext;
use crate::client::api::{AttachOptions, ContainerConfig, CreateResponse, HostConfig, PortBinding};
use crate::hijack::escape::resolve_detach_keys;
use crate::hijack::{hold_session, HijackOptions, HijackOutcome};
use crate::opts::keyvalue::{expand_env, parse_label, to_map};
use crate::opts::ports::parse_port_spec;
use crate::registry::ImageReference;
use crate::CliError;
use clap::Args;
use serde_json::json;
use std::io::Write;

/// Arguments for the `run` command
#[derive(Args)]
pub struct RunArgs {
    /// Image to run
    pub image: String,

    /// Command to run in the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Assign a name to the container
    #[arg(long)]
    pub name: Option<String>,

    /// Run container in background and print container ID
    #[arg(short, long)]
    pub detach: bool,

    /// Override the key sequence for detaching a container
    #[arg(long)]
    pub detach_keys: Option<String>,

    /// Automatically remove the container when it exits
    #[arg(long)]
    pub rm: bool,

    /// Set environment variables
    #[arg(short, long)]
    pub env: Vec<String>,

    /// Bind mount a volume
    #[arg(short, long)]
    pub volume: Vec<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Username or UID (format: "<name|uid>[:<group|gid>]")
    #[arg(short, long)]
    pub user: Option<String>,

    /// Keep STDIN open even if not attached
    #[arg(short, long)]
    pub interactive: bool,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// Overwrite the default ENTRYPOINT of the image
    #[arg(long)]
    pub entrypoint: Option<String>,

    /// Add a custom host-to-IP mapping (host:ip)
    #[arg(long)]
    pub add_host: Vec<String>,

    /// Container host name
    #[arg(long)]
    pub hostname: Option<String>,

    /// Set meta data on a container
    #[arg(short, long)]
    pub label: Vec<String>,

    /// Connect a container to a network
    #[arg(long)]
    pub network: Option<String>,

    /// Publish a container's port(s) to the host
    #[arg(short, long)]
    pub publish: Vec<String>,

    /// Give extended privileges to this container
    #[arg(long)]
    pub privileged: bool,

    /// Set platform if server is multi-platform capable
    #[arg(long, env = DEFAULT_PLATFORM_ENV)]
    pub platform: Option<String>,

    /// Mount the container's root filesystem as read only
    #[arg(long)]
    pub read_only: bool,

    /// Suppress the pull output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Translate flags into the create request body.
fn container_config(args: &RunArgs) -> crate::Result<ContainerConfig> {
    let mut exposed_ports = std::collections::BTreeMap::new();
    let mut port_bindings = std::collections::BTreeMap::new();
    for spec in &args.publish {
        for mapping in parse_port_spec(spec)? {
            exposed_ports.insert(mapping.port_key(), json!({}));
            port_bindings
                .entry(mapping.port_key())
                .or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: mapping.host_ip,
                    host_port: mapping.host_port,
                });
        }
    }

    let attach = !args.detach;
    Ok(ContainerConfig {
        image: args.image.clone(),
        cmd: args.command.clone(),
        entrypoint: args.entrypoint.as_ref().map(|e| {
            if e.is_empty() {
                Vec::new()
            } else {
                vec![e.clone()]
            }
        }),
        env: expand_env(&args.env, |k| std::env::var(k).ok())?,
        working_dir: args.workdir.clone(),
        user: args.user.clone(),
        hostname: args.hostname.clone(),
        tty: args.tty,
        open_stdin: args.interactive,
        stdin_once: args.interactive && attach,
        attach_stdin: args.interactive && attach,
        attach_stdout: attach,
        attach_stderr: attach,
        labels: to_map(&args.label, parse_label)?,
        exposed_ports,
        host_config: HostConfig {
            auto_remove: args.rm,
            binds: args.volume.clone(),
            port_bindings,
            network_mode: args.network.clone(),
            extra_hosts: args.add_host.clone(),
            privileged: args.privileged,
            readonly_rootfs: args.read_only,
        },
    })
}

/// Create the container, pulling the image once if the daemon lacks it.
async fn create_container(
    cli: &CliContext,
    args: &RunArgs,
    config: &ContainerConfig,
) -> anyhow::Result<CreateResponse> {
    let client = cli.client().await?;
    let platform = args.platform.as_deref();
    match client.container_create(config, args.name.as_deref(), platform).await {
        Err(e) if e.is_not_found() && e.to_string().contains("No such image") => {
            let reference = ImageReference::parse(&args.image)?;
            let mut err = cli.streams.err.clone();
            writeln!(err, "Unable to find image '{}' locally", reference.full_name())?;
            pull_image(
                cli,
                &args.image,
                false,
                args.platform.clone(),
                args.quiet,
                cli.streams.err.clone(),
            )
            .await?;
            Ok(client
                .container_create(config, args.name.as_deref(), platform)
                .await?)
        }
        other => Ok(other?),
    }
}

/// Execute the `run` command
pub async fn execute(cli: &CliContext, args: RunArgs) -> anyhow::Result<()> {
    let config = container_config(&args)?;
    let client = cli.client().await?;
    let created = create_container(cli, &args, &config).await?;

    let mut err = cli.streams.err.clone();
    for warning in &created.warnings {
        writeln!(err, "WARNING: {}", warning)?;
    }

    if args.detach {
        client.container_start(&created.id).await?;
        let mut out = cli.streams.out.clone();
        writeln!(out, "{}", created.id)?;
        return Ok(());
    }

    let configured_keys = cli.config.lock()?.detach_keys.clone();
    let raw_keys = args.detach_keys.clone().or(configured_keys);
    let attach = AttachOptions {
        stream: true,
        stdin: args.interactive,
        stdout: true,
        stderr: true,
        logs: false,
        detach_keys: raw_keys.clone(),
    };
    let conn = client.container_attach(&created.id, &attach).await?;

    // registered before start, a fast exit must still be observed
    let condition = if args.rm { "removed" } else { "next-exit" };
    let waiter = {
        let client = client.clone();
        let id = created.id.clone();
        tokio::spawn(async move { client.container_wait(&id, condition).await })
    };

    if let Err(e) = client.container_start(&created.id).await {
        waiter.abort();
        return Err(e.into());
    }

    let stop = cli.cancel.child_token();
    if args.tty {
        forward_resizes(cli, client.clone(), ResizeTarget::Container(created.id.clone()), &stop);
    }
    let hijack = HijackOptions {
        attach_stdin: args.interactive,
        attach_stdout: true,
        attach_stderr: true,
        tty: args.tty,
        detach_keys: resolve_detach_keys(raw_keys.as_deref(), None),
    };
    let outcome = hold_session(conn, &cli.streams, &hijack, &cli.cancel).await;
    stop.cancel();
    match outcome {
        Ok(HijackOutcome::Detached) => {
            waiter.abort();
            return Ok(());
        }
        Err(e) => {
            waiter.abort();
            return Err(e.into());
        }
        Ok(HijackOutcome::Completed) => {}
    }

    let waited = waiter
        .await
        .map_err(|e| CliError::system(format!("wait task failed: {}", e)))??;
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
