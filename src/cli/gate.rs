//! Daemon requirements attached to commands
//!
//! A gated command stays invocable, but fails with an explanation when the
//! daemon does not meet its requirements and is left out of help output.

use crate::client::api::PingInfo;
use crate::client::version;
use crate::{CliError, Result, APP_NAME};
use clap::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmRequirement {
    Active,
    Manager,
}

/// What a command needs from the daemon
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gate {
    pub min_api: Option<&'static str>,
    pub os_type: Option<&'static str>,
    pub swarm: Option<SwarmRequirement>,
    pub experimental: bool,
}

impl Gate {
    pub const fn api(min: &'static str) -> Self {
        Self {
            min_api: Some(min),
            os_type: None,
            swarm: None,
            experimental: false,
        }
    }
}

/// Gated commands, by path below the root command
pub const GATES: &[(&str, Gate)] = &[
    ("builder", Gate::api("1.31")),
    ("container prune", Gate::api("1.25")),
    ("image prune", Gate::api("1.25")),
    ("network prune", Gate::api("1.25")),
    ("volume prune", Gate::api("1.25")),
    (
        "volume update",
        Gate {
            min_api: Some("1.42"),
            os_type: None,
            swarm: Some(SwarmRequirement::Manager),
            experimental: false,
        },
    ),
];

fn applies(key: &str, path: &str) -> bool {
    path == key || path.strip_prefix(key).is_some_and(|rest| rest.starts_with(' '))
}

/// Whether any gate covers `path`, i.e. whether the daemon must be asked.
pub fn is_gated(table: &[(&str, Gate)], path: &[String]) -> bool {
    let path = path.join(" ");
    table.iter().any(|(key, _)| applies(key, &path))
}

fn check_one(command: &str, gate: &Gate, ping: &PingInfo) -> Result<()> {
    if let Some(min) = gate.min_api {
        if version::less_than(&ping.api_version, min) {
            return Err(CliError::NotImplemented(format!(
                "{} requires API version {}, but the Docker daemon API version is {}",
                command, min, ping.api_version
            )));
        }
    }
    if let Some(os) = gate.os_type {
        if !ping.os_type.is_empty() && ping.os_type != os {
            return Err(CliError::NotImplemented(format!(
                "{} is only supported on a Docker daemon running on {}, but the Docker daemon is running on {}",
                command, os, ping.os_type
            )));
        }
    }
    match gate.swarm {
        Some(SwarmRequirement::Manager) if !ping.swarm_manager() => {
            return Err(CliError::NotImplemented(format!(
                "{} is only supported on a Docker daemon that is a swarm manager",
                command
            )));
        }
        Some(SwarmRequirement::Active) if !ping.swarm_active() => {
            return Err(CliError::NotImplemented(format!(
                "{} is only supported on a Docker daemon with swarm mode active",
                command
            )));
        }
        _ => {}
    }
    if gate.experimental && !ping.experimental {
        return Err(CliError::NotImplemented(format!(
            "{} is only supported on a Docker daemon with experimental features enabled",
            command
        )));
    }
    Ok(())
}

/// Check every gate covering `path`, outermost first.
pub fn check(table: &[(&str, Gate)], path: &[String], ping: &PingInfo) -> Result<()> {
    let joined = path.join(" ");
    let command = format!("{} {}", APP_NAME, joined);
    for (key, gate) in table {
        if applies(key, &joined) {
            check_one(&command, gate, ping)?;
        }
    }
    Ok(())
}

fn hide_path(cmd: Command, path: &[&str]) -> Command {
    match path {
        [] => cmd.hide(true),
        [first, rest @ ..] => {
            let rest = rest.to_vec();
            if cmd.find_subcommand(first).is_none() {
                return cmd;
            }
            cmd.mut_subcommand(*first, move |sub| hide_path(sub, &rest))
        }
    }
}

/// Hide the subcommands `ping` does not satisfy.
pub fn hide_unsupported(mut cmd: Command, table: &[(&str, Gate)], ping: &PingInfo) -> Command {
    for (key, gate) in table {
        if check_one(key, gate, ping).is_err() {
            let path: Vec<&str> = key.split(' ').collect();
            cmd = hide_path(cmd, &path);
        }
    }
    cmd
}

/// Hide the named top-level subcommands.
pub fn hide_all(mut cmd: Command, names: &[&str]) -> Command {
    for name in names {
        cmd = hide_path(cmd, &[name]);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    fn tree() -> Command {
        Command::new("docker")
            .subcommand(
                Command::new("volume")
                    .subcommand(Command::new("ls").about("List volumes"))
                    .subcommand(Command::new("update").about("Update a volume (cluster volumes only)")),
            )
            .subcommand(Command::new("checkpoint").about("Manage checkpoints"))
    }

    fn ping(api: &str) -> PingInfo {
        PingInfo {
            api_version: api.to_string(),
            os_type: "linux".to_string(),
            experimental: false,
            swarm: Some("active/manager".to_string()),
        }
    }

    fn path(p: &str) -> Vec<String> {
        p.split(' ').map(str::to_string).collect()
    }

    const TABLE: &[(&str, Gate)] = &[
        ("volume update", Gate::api("1.42")),
        (
            "checkpoint",
            Gate {
                min_api: None,
                os_type: Some("linux"),
                swarm: None,
                experimental: true,
            },
        ),
    ];

    #[test]
    fn test_version_gate_rejects_old_daemon() {
        let err = check(TABLE, &path("volume update"), &ping("1.40")).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        let message = err.to_string();
        assert!(message.contains("docker volume update"), "{}", message);
        assert!(message.contains("requires API version 1.42"), "{}", message);
        assert!(message.contains("1.40"), "{}", message);

        assert!(check(TABLE, &path("volume update"), &ping("1.43")).is_ok());
        assert!(check(TABLE, &path("volume ls"), &ping("1.40")).is_ok());
    }

    #[test]
    fn test_gated_command_absent_from_help() {
        let mut cmd = hide_unsupported(tree(), TABLE, &ping("1.40"));
        let volume = cmd.find_subcommand_mut("volume").unwrap();
        let help = volume.render_help().to_string();
        assert!(help.contains("ls"), "{}", help);
        assert!(!help.contains("update"), "{}", help);

        let root_help = cmd.render_help().to_string();
        assert!(!root_help.contains("checkpoint"), "{}", root_help);
    }

    #[test]
    fn test_satisfied_gates_keep_commands_visible() {
        let mut satisfied = ping("1.45");
        satisfied.experimental = true;
        let mut cmd = hide_unsupported(tree(), TABLE, &satisfied);
        let help = cmd.find_subcommand_mut("volume").unwrap().render_help().to_string();
        assert!(help.contains("update"));
        assert!(cmd.render_help().to_string().contains("checkpoint"));
    }

    #[test]
    fn test_ancestor_gates_apply_to_children() {
        let mut windows = ping("1.45");
        windows.os_type = "windows".to_string();
        windows.experimental = true;
        let err = check(TABLE, &path("checkpoint create"), &windows).unwrap_err();
        assert!(err.to_string().contains("running on linux"));
        assert!(is_gated(TABLE, &path("checkpoint ls")));
        assert!(!is_gated(TABLE, &path("checkpointx")));
    }

    #[test]
    fn test_swarm_and_experimental_gates() {
        let worker = PingInfo {
            swarm: Some("active/worker".to_string()),
            ..ping("1.45")
        };
        let gate = Gate {
            swarm: Some(SwarmRequirement::Manager),
            ..Default::default()
        };
        assert!(check_one("docker x", &gate, &worker).is_err());
        let active = Gate {
            swarm: Some(SwarmRequirement::Active),
            ..Default::default()
        };
        assert!(check_one("docker x", &active, &worker).is_ok());

        let experimental = Gate {
            experimental: true,
            ..Default::default()
        };
        let err = check_one("docker x", &experimental, &worker).unwrap_err();
        assert!(err.to_string().contains("experimental"));
    }
}
