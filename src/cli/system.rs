//! `docker system` and `docker info` command implementation

use super::CliContext;
use crate::client::api::SystemInfo;
use crate::formatter::Template;
use crate::opts::filters::parse_filter_flag;
use crate::opts::units::human_size;
use crate::opts::Filters;
use crate::plugin::dial_stdio::proxy;
use crate::prune::{builtin_registry, system_prune, SystemPruneOptions};
use crate::VERSION;
use clap::{Args, Subcommand};
use std::io::Write;

/// Arguments for the `system` command
#[derive(Args)]
#[command(arg_required_else_help = true)]
pub struct SystemArgs {
    #[command(subcommand)]
    pub command: SystemCommands,
}

/// System subcommands
#[derive(Subcommand)]
pub enum SystemCommands {
    /// Display system-wide information
    Info(InfoArgs),
    /// Remove unused data
    Prune(SystemPruneArgs),
    /// Proxy the stdio stream to the daemon connection
    #[command(name = "dial-stdio", hide = true)]
    DialStdio,
}

/// Arguments for system info
#[derive(Args)]
pub struct InfoArgs {
    /// Format output using a custom template
    #[arg(short, long)]
    pub format: Option<String>,
}

/// Arguments for system prune
#[derive(Args)]
pub struct SystemPruneArgs {
    /// Remove all unused images not just dangling ones
    #[arg(short, long)]
    pub all: bool,

    /// Do not prompt for confirmation
    #[arg(short, long)]
    pub force: bool,

    /// Prune anonymous volumes
    #[arg(long)]
    pub volumes: bool,

    /// Provide filter values (e.g. "label=<key>=<value>")
    #[arg(long, value_parser = parse_filter_flag)]
    pub filter: Vec<String>,
}

/// Execute the `system` command
pub async fn execute(cli: &CliContext, args: SystemArgs) -> anyhow::Result<()> {
    match args.command {
        SystemCommands::Info(args) => execute_info(cli, args).await,
        SystemCommands::Prune(args) => prune(cli, args).await,
        SystemCommands::DialStdio => dial_stdio(cli).await,
    }
}

/// Execute `docker info`
pub async fn execute_info(cli: &CliContext, args: InfoArgs) -> anyhow::Result<()> {
    let info = cli.client().await?.info().await?;
    let mut out = cli.streams.out.clone();

    if let Some(format) = args.format.as_deref().filter(|f| !f.is_empty()) {
        let value = serde_json::to_value(&info)?;
        let source = if format == "json" { "{{json .}}" } else { format };
        let rendered = Template::parse(source)?.execute(&value)?;
        writeln!(out, "{}", rendered)?;
        return Ok(());
    }

    write!(out, "{}", render_info(cli.current_context(), &info))?;
    Ok(())
}

fn render_info(context: &str, info: &SystemInfo) -> String {
    let mut lines = vec![
        "Client:".to_string(),
        format!(" Version:    {}", VERSION),
        format!(" Context:    {}", context),
        String::new(),
        "Server:".to_string(),
        format!(" Containers: {}", info.containers),
        format!("  Running: {}", info.containers_running),
        format!("  Paused: {}", info.containers_paused),
        format!("  Stopped: {}", info.containers_stopped),
        format!(" Images: {}", info.images),
        format!(" Server Version: {}", info.server_version),
        format!(" Storage Driver: {}", info.driver),
    ];
    if !info.swarm.local_node_state.is_empty() {
        lines.push(format!(" Swarm: {}", info.swarm.local_node_state));
    }
    lines.extend([
        format!(" Operating System: {}", info.operating_system),
        format!(" OSType: {}", info.os_type),
        format!(" Architecture: {}", info.architecture),
        format!(" CPUs: {}", info.ncpu),
        format!(" Total Memory: {}", human_size(info.mem_total.max(0) as u64)),
        format!(" Name: {}", info.name),
        format!(" ID: {}", info.id),
        format!(" Docker Root Dir: {}", info.docker_root_dir),
        format!(" Experimental: {}", info.experimental_build),
    ]);

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

async fn prune(cli: &CliContext, args: SystemPruneArgs) -> anyhow::Result<()> {
    let mut filters = Filters::from_flags(&args.filter)?;
    let defaults = Filters::from_flags(&cli.config.lock()?.prune_filters)?;
    filters.merge_defaults(&defaults);

    let opts = SystemPruneOptions {
        force: args.force,
        all: args.all,
        volumes: args.volumes,
        filters,
    };
    let client = cli.client().await?;
    let registry = builtin_registry();
    system_prune(&registry, client.as_ref(), &cli.streams, &cli.cancel, &opts).await?;
    Ok(())
}

/// Bridge this process's stdio to a raw daemon connection.
async fn dial_stdio(cli: &CliContext) -> anyhow::Result<()> {
    let client = cli.scoped_client().await?;
    let conn = client.dial_raw().await?;
    tracing::debug!("dial-stdio connected to {:?}", conn);

    let mut stdin = cli.streams.input.lock().await;
    proxy(conn, &mut *stdin, tokio::io::stdout()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use crate::client::api::PruneReport;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_render_info_sections() {
        let info = SystemInfo {
            name: "host1".into(),
            containers: 3,
            containers_running: 1,
            containers_stopped: 2,
            mem_total: 2_000_000_000,
            ..Default::default()
        };
        let text = render_info("default", &info);
        assert!(text.starts_with("Client:\n"));
        assert!(text.contains(" Context:    default\n"));
        assert!(text.contains("\nServer:\n Containers: 3\n  Running: 1\n"));
        assert!(text.contains(" Total Memory: 2GB\n"));
        assert!(!text.contains("Swarm"));
    }

    #[tokio::test]
    async fn test_info_with_template() {
        let dir = TempDir::new().unwrap();
        let (code, out, _) = run_against(
            Arc::new(FakeDaemon::new("1.45")),
            &dir,
            &["info", "--format", "{{.Name}} {{.ServerVersion}}"],
        )
        .await;
        assert_eq!(code, 0);
        assert_eq!(out, "fakehost 27.0.0\n");
    }

    #[tokio::test]
    async fn test_info_bad_template_exits_64() {
        let dir = TempDir::new().unwrap();
        let (code, _, err) = run_against(
            Arc::new(FakeDaemon::new("1.45")),
            &dir,
            &["system", "info", "--format", "{{.Name"],
        )
        .await;
        assert_eq!(code, 64, "{}", err);
    }

    #[tokio::test]
    async fn test_system_prune_runs_types_in_order() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.45");
        daemon.prune = PruneReport {
            deleted: Vec::new(),
            space_reclaimed: 1000,
        };
        let daemon = Arc::new(daemon);
        let (code, out, _) =
            run_against(daemon.clone(), &dir, &["system", "prune", "--force", "--volumes"]).await;
        assert_eq!(code, 0);
        assert_eq!(
            daemon.calls(),
            vec![
                "container prune",
                "network prune",
                "volume prune {}",
                "image prune",
                "builder prune all=false"
            ]
        );
        assert!(out.ends_with("Total reclaimed space: 4kB\n"), "{}", out);
    }

    #[tokio::test]
    async fn test_system_prune_skips_build_cache_on_old_daemon() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.30"));
        let (code, _, _) = run_against(daemon.clone(), &dir, &["system", "prune", "-f"]).await;
        assert_eq!(code, 0);
        assert_eq!(
            daemon.calls(),
            vec!["container prune", "network prune", "image prune"]
        );
    }
}
