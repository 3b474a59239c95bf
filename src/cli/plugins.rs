//! Dispatch to CLI plugins and their listing in root help

use super::{builtin_names, CliContext};
use crate::plugin::{get_plugin, list_plugins, run_plugin, search_dirs, Plugin};
use crate::{CliError, ErrorKind, EXIT_PLUGIN_NOT_EXECUTABLE, EXIT_UNKNOWN_COMMAND};
use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

fn plugin_dirs(cli: &CliContext) -> crate::Result<Vec<PathBuf>> {
    let config = cli.config.lock()?;
    Ok(search_dirs(cli.paths(), &config))
}

/// Run the plugin named by `args[0]`, passing the rest through.
pub async fn execute(cli: &CliContext, args: Vec<String>) -> anyhow::Result<()> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(());
    };

    let plugin = match get_plugin(name, &plugin_dirs(cli)?, &builtin_names()).await {
        Ok(plugin) => plugin,
        Err(e) if e.kind() == ErrorKind::Forbidden => {
            return Err(CliError::Status {
                message: e.to_string(),
                code: EXIT_PLUGIN_NOT_EXECUTABLE,
            }
            .into());
        }
        Err(e) => {
            tracing::debug!("plugin lookup for {} failed: {}", name, e);
            let mut err = cli.streams.err.clone();
            writeln!(err, "docker: '{}' is not a docker command.", name)?;
            writeln!(err, "See 'docker --help'")?;
            return Err(CliError::Status {
                message: String::new(),
                code: EXIT_UNKNOWN_COMMAND,
            }
            .into());
        }
    };

    let code = run_plugin(&plugin, cli.globals(), rest).await?;
    if code != 0 {
        return Err(CliError::Status {
            message: String::new(),
            code,
        }
        .into());
    }
    Ok(())
}

/// "Management Commands" style listing of installed plugins, if any.
pub async fn help_section(cli: &CliContext) -> Option<String> {
    let dirs = plugin_dirs(cli).ok()?;
    let plugins = list_plugins(&dirs, &builtin_names()).await;
    render_section(&plugins)
}

fn render_section(plugins: &[Plugin]) -> Option<String> {
    if plugins.is_empty() {
        return None;
    }
    let width = plugins.iter().map(|p| p.name.len()).max().unwrap_or(0) + 2;

    let mut section = String::new();
    let (valid, invalid): (Vec<&Plugin>, Vec<&Plugin>) = plugins.iter().partition(|p| p.is_valid());
    if !valid.is_empty() {
        section.push_str("Plugin Commands:\n");
        for plugin in &valid {
            let about = if plugin.metadata.vendor.is_empty() {
                plugin.metadata.short_description.clone()
            } else {
                format!("{} ({})", plugin.metadata.short_description, plugin.metadata.vendor)
            };
            let _ = writeln!(section, "  {:<width$}{}", plugin.name, about, width = width);
        }
    }
    if !invalid.is_empty() {
        if !section.is_empty() {
            section.push('\n');
        }
        section.push_str("Invalid Plugins:\n");
        for plugin in &invalid {
            let reason = plugin.error.as_deref().unwrap_or_default();
            let _ = writeln!(section, "  {:<width$}{}", plugin.name, reason, width = width);
        }
    }
    Some(section.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::run_against;
    use crate::cli::testing::FakeDaemon;
    use crate::plugin::manager::tests::{metadata_script, write_script};
    use crate::plugin::Metadata;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_section_lists_valid_and_invalid() {
        let plugins = vec![
            Plugin {
                name: "compose".into(),
                path: "/p/docker-compose".into(),
                metadata: Metadata {
                    schema_version: "0.1.0".into(),
                    vendor: "Docker Inc.".into(),
                    short_description: "Docker Compose".into(),
                    ..Default::default()
                },
                error: None,
                shadowed_paths: Vec::new(),
            },
            Plugin {
                name: "broken".into(),
                path: "/p/docker-broken".into(),
                metadata: Metadata::default(),
                error: Some("plugin metadata does not define a vendor".into()),
                shadowed_paths: Vec::new(),
            },
        ];
        let section = render_section(&plugins).unwrap();
        assert!(section.starts_with("Plugin Commands:\n  compose"), "{}", section);
        assert!(section.contains("Docker Compose (Docker Inc.)"));
        assert!(section.contains("Invalid Plugins:\n  broken"));
        assert!(render_section(&[]).is_none());
    }

    #[tokio::test]
    async fn test_unknown_command_exits_127() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon, &dir, &["frobnicate", "now"]).await;
        assert_eq!(code, EXIT_UNKNOWN_COMMAND);
        assert!(err.contains("docker: 'frobnicate' is not a docker command."), "{}", err);
    }

    #[tokio::test]
    async fn test_plugin_receives_globals_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("cli-plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        let record = dir.path().join("argv");
        let body = format!("printf '%s ' \"$@\" > '{}'\nexit 3", record.display());
        write_script(&plugins, "docker-hello", &metadata_script("Acme", &body));
        std::fs::write(
            dir.path().join("config.json"),
            format!(r#"{{"cliPluginsExtraDirs":["{}"]}}"#, plugins.display()),
        )
        .unwrap();

        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, _) =
            run_against(daemon, &dir, &["--log-level=debug", "hello", "system", "dial-stdio"]).await;
        assert_eq!(code, 3);
        let argv = std::fs::read_to_string(&record).unwrap();
        assert_eq!(
            argv,
            format!(
                "--config={} --log-level=debug hello system dial-stdio ",
                dir.path().display()
            )
        );
    }

    #[tokio::test]
    async fn test_non_executable_plugin_exits_126() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        let path = write_script(&plugins, "docker-hello", &metadata_script("Acme", "exit 0"));
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon, &dir, &["hello"]).await;
        assert_eq!(code, EXIT_PLUGIN_NOT_EXECUTABLE);
        assert!(err.contains("not executable"), "{}", err);
    }

    #[tokio::test]
    async fn test_colliding_plugins_are_not_run() {
        let dir = TempDir::new().unwrap();
        let extra = dir.path().join("cli-plugins");
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&extra).unwrap();
        std::fs::create_dir_all(&plugins).unwrap();
        write_script(&plugins, "docker-hello", &metadata_script("Acme", "exit 0"));
        write_script(&extra, "docker-hello", &metadata_script("Acme", "exit 0"));
        std::fs::write(
            dir.path().join("config.json"),
            format!(r#"{{"cliPluginsExtraDirs":["{}"]}}"#, extra.display()),
        )
        .unwrap();

        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon.clone(), &dir, &["hello"]).await;
        assert_eq!(code, EXIT_UNKNOWN_COMMAND);
        assert!(err.contains("is not a docker command"), "{}", err);

        let (_, out, _) = run_against(daemon, &dir, &["--help"]).await;
        assert!(out.contains("Invalid Plugins:"), "{}", out);
        assert!(out.contains("collides with"), "{}", out);
    }

    #[tokio::test]
    async fn test_root_help_lists_plugins() {
        let dir = TempDir::new().unwrap();
        let plugins = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins).unwrap();
        write_script(&plugins, "docker-hello", &metadata_script("Acme", "exit 0"));

        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, out, _) = run_against(daemon, &dir, &["--help"]).await;
        assert_eq!(code, 0);
        assert!(out.contains("Plugin Commands:"), "{}", out);
        assert!(out.contains("hello"), "{}", out);
    }
}
