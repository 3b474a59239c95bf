//! Executing a plugin on behalf of the root command

use super::socket::ControlServer;
use super::{Plugin, ORIGINAL_CLI_COMMAND_ENV, SOCKET_ENV};
use crate::{CliError, Result, EXIT_PLUGIN_NOT_EXECUTABLE, EXIT_UNKNOWN_COMMAND};
use std::os::unix::process::ExitStatusExt;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};

/// Signals after which a still-running plugin is killed
const FORCE_KILL_AFTER: u32 = 3;

/// Root flags already parsed by the parent, handed on to the plugin
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalFlags {
    pub config: Option<String>,
    pub context: Option<String>,
    pub hosts: Vec<String>,
    pub log_level: Option<String>,
    pub tls: bool,
    pub tls_ca_cert: Option<String>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub tls_verify: bool,
}

impl GlobalFlags {
    /// `--flag=value` arguments in a fixed order
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config {
            args.push(format!("--config={}", config));
        }
        if let Some(context) = &self.context {
            args.push(format!("--context={}", context));
        }
        for host in &self.hosts {
            args.push(format!("--host={}", host));
        }
        if let Some(level) = &self.log_level {
            args.push(format!("--log-level={}", level));
        }
        if self.tls {
            args.push("--tls".to_string());
        }
        if let Some(ca) = &self.tls_ca_cert {
            args.push(format!("--tlscacert={}", ca));
        }
        if let Some(cert) = &self.tls_cert {
            args.push(format!("--tlscert={}", cert));
        }
        if let Some(key) = &self.tls_key {
            args.push(format!("--tlskey={}", key));
        }
        if self.tls_verify {
            args.push("--tlsverify".to_string());
        }
        args
    }
}

/// Run `plugin` with `args` and return its exit code.
///
/// The first SIGINT/SIGTERM is forwarded over the control socket as a
/// cancel request; on the third the plugin is killed.
pub async fn run_plugin(plugin: &Plugin, globals: &GlobalFlags, args: &[String]) -> Result<i32> {
    let server = match ControlServer::bind() {
        Ok(server) => Some(server),
        Err(e) => {
            tracing::warn!("plugin control socket unavailable: {}", e);
            None
        }
    };

    let mut command = Command::new(&plugin.path);
    command
        .args(globals.to_args())
        .arg(&plugin.name)
        .args(args)
        .kill_on_drop(true);
    if let Ok(exe) = std::env::current_exe() {
        command.env(ORIGINAL_CLI_COMMAND_ENV, exe);
    }
    if let Some(server) = &server {
        command.env(SOCKET_ENV, server.path());
    }

    tracing::debug!("running plugin {} from {}", plugin.name, plugin.path.display());
    let mut child = command.spawn().map_err(|e| {
        let code = match e.kind() {
            std::io::ErrorKind::PermissionDenied => EXIT_PLUGIN_NOT_EXECUTABLE,
            std::io::ErrorKind::NotFound => EXIT_UNKNOWN_COMMAND,
            _ => 1,
        };
        CliError::Status {
            message: format!("failed to run plugin {}: {}", plugin.name, e),
            code,
        }
    })?;

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut received = 0;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            _ = interrupt.recv() => received += 1,
            _ = terminate.recv() => received += 1,
        }
        if received == 1 {
            if let Some(server) = &server {
                server.cancel().await;
            }
        }
        if received >= FORCE_KILL_AFTER {
            let _ = child.kill().await;
            return Err(CliError::Status {
                message: format!(
                    "got {} SIGTERM/SIGINTs, forcefully exiting",
                    FORCE_KILL_AFTER
                ),
                code: 1,
            });
        }
    };

    let code = status
        .code()
        .or_else(|| server.as_ref().and_then(ControlServer::reported_exit))
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(1);
    Ok(code)
}
