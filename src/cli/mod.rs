//! CLI command definitions and handlers

pub mod builder;
pub mod container;
pub mod context;
pub mod exec;
pub mod gate;
pub mod image;
pub mod images;
pub mod inspect;
pub mod login;
pub mod logs;
pub mod network;
pub mod plugins;
pub mod ps;
pub mod pull;
pub mod push;
pub mod rm;
pub mod run;
pub mod session;
pub mod start;
pub mod stop;
pub mod system;
pub mod tag;
pub mod version;
pub mod volume;

#[cfg(test)]
pub(crate) mod testing;

pub use session::CliContext;

use crate::client::api::DaemonApi;
use crate::config::paths::CONFIG_DIR_ENV;
use crate::opts::Filters;
use crate::prompt::PROMPT_TERMINATED;
use crate::prune::{self, PruneOptions};
use crate::streams::{OutStream, Streams};
use crate::{exit_code_for, CliError, ErrorKind, EXIT_INTERRUPTED, EXIT_USAGE, VERSION};
use clap::error::ErrorKind as ClapErrorKind;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Top-level shortcuts of management subcommands
pub const LEGACY_COMMANDS: &[&str] = &[
    "attach", "exec", "images", "logs", "ps", "pull", "push", "rm", "rmi", "run", "start",
    "stop", "tag",
];

/// Non-empty hides [`LEGACY_COMMANDS`] from help
pub const HIDE_LEGACY_ENV: &str = "DOCKER_HIDE_LEGACY_COMMANDS";

/// How long an interrupted command may take to wind down by itself
const INTERRUPT_GRACE: Duration = Duration::from_secs(1);

/// Signals after which the CLI stops waiting for the command
const FORCE_EXIT_AFTER: u32 = 3;

/// Flags accepted before the subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Location of client config files
    #[arg(long, env = CONFIG_DIR_ENV, hide_env_values = true, value_name = "string")]
    pub config: Option<String>,

    /// Name of the context to use to connect to the daemon
    #[arg(short, long, value_name = "string")]
    pub context: Option<String>,

    /// Daemon socket to connect to
    #[arg(short = 'H', long = "host", value_name = "list")]
    pub hosts: Vec<String>,

    /// Set the logging level
    #[arg(
        short,
        long,
        value_name = "string",
        value_parser = ["debug", "info", "warn", "error", "fatal"]
    )]
    pub log_level: Option<String>,

    /// Use TLS; implied by --tlsverify
    #[arg(long)]
    pub tls: bool,

    /// Trust certs signed only by this CA
    #[arg(long = "tlscacert", value_name = "string")]
    pub tls_ca_cert: Option<String>,

    /// Path to TLS certificate file
    #[arg(long = "tlscert", value_name = "string")]
    pub tls_cert: Option<String>,

    /// Path to TLS key file
    #[arg(long = "tlskey", value_name = "string")]
    pub tls_key: Option<String>,

    /// Use TLS and verify the remote
    #[arg(long = "tlsverify")]
    pub tls_verify: bool,
}

/// A self-sufficient runtime for containers
#[derive(Parser)]
#[command(name = "docker", about = "A self-sufficient runtime for containers")]
#[command(disable_version_flag = true, subcommand_value_name = "COMMAND")]
pub struct Cli {
    #[command(flatten)]
    pub globals: GlobalOptions,

    /// Print version information and quit
    #[arg(short = 'v', long)]
    pub version: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Manage builds
    Builder(builder::BuilderArgs),

    /// Manage containers
    Container(container::ContainerArgs),

    /// Manage contexts
    Context(context::ContextArgs),

    /// Manage images
    Image(image::ImageArgs),

    /// Manage networks
    Network(network::NetworkArgs),

    /// Manage Docker
    System(system::SystemArgs),

    /// Manage volumes
    Volume(volume::VolumeArgs),

    /// Attach local standard input, output, and error streams to a running container
    Attach(exec::AttachArgs),

    /// Execute a command in a running container
    Exec(exec::ExecArgs),

    /// List images
    Images(images::ImagesArgs),

    /// Display system-wide information
    Info(system::InfoArgs),

    /// Return low-level information on Docker objects
    Inspect(inspect::InspectArgs),

    /// Authenticate to a registry
    Login(login::LoginArgs),

    /// Log out from a registry
    Logout(login::LogoutArgs),

    /// Fetch the logs of a container
    Logs(logs::LogsArgs),

    /// List containers
    Ps(ps::PsArgs),

    /// Download an image from a registry
    Pull(pull::PullArgs),

    /// Upload an image to a registry
    Push(push::PushArgs),

    /// Remove one or more containers
    Rm(rm::RmArgs),

    /// Remove one or more images
    Rmi(rm::RmiArgs),

    /// Create and run a new container from an image
    Run(run::RunArgs),

    /// Start one or more stopped containers
    Start(start::StartArgs),

    /// Stop one or more running containers
    Stop(stop::StopArgs),

    /// Create a tag TARGET_IMAGE that refers to SOURCE_IMAGE
    Tag(tag::TagArgs),

    /// Show the Docker version information
    Version(version::VersionArgs),

    /// A CLI plugin
    #[command(external_subcommand)]
    Plugin(Vec<String>),
}

/// The root command with environment-dependent visibility applied
pub fn root_command() -> clap::Command {
    let command = Cli::command();
    let hide_legacy = std::env::var_os(HIDE_LEGACY_ENV).is_some_and(|v| !v.is_empty());
    if hide_legacy {
        gate::hide_all(command, LEGACY_COMMANDS)
    } else {
        command
    }
}

/// Names of every built-in top-level command, hidden ones included
pub fn builtin_names() -> Vec<String> {
    Cli::command()
        .get_subcommands()
        .map(|c| c.get_name().to_string())
        .collect()
}

/// Install the tracing subscriber once; later calls are ignored.
pub fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some("fatal") => EnvFilter::new("error"),
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Runs one invocation of the CLI
pub struct Runner {
    streams: Streams,
    client: Option<Arc<dyn DaemonApi>>,
    handle_signals: bool,
}

impl Runner {
    pub fn new(streams: Streams) -> Self {
        Self {
            streams,
            client: None,
            handle_signals: true,
        }
    }

    /// Serve daemon calls from `client` instead of dialing.
    pub fn with_client(mut self, client: Arc<dyn DaemonApi>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Parse `argv` (program name first), run the command and return the
    /// process exit code.
    pub async fn run(self, argv: Vec<String>) -> i32 {
        let mut command = root_command();
        let parsed = command
            .try_get_matches_from_mut(&argv)
            .and_then(|matches| Cli::from_arg_matches(&matches).map(|cli| (cli, matches)));
        let (parsed, matches) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => return self.parse_failure(e, &argv).await,
        };

        init_logging(parsed.globals.log_level.as_deref());
        if parsed.version {
            let mut out = self.streams.out.clone();
            let _ = writeln!(out, "Docker version {}", VERSION);
            return 0;
        }
        let Some(subcommand) = parsed.command else {
            let help = self.help_text(&argv).await;
            let mut out = self.streams.out.clone();
            let _ = write!(out, "{}", help);
            return 0;
        };

        let cancel = CancellationToken::new();
        let cli = match CliContext::new(self.streams.clone(), &parsed.globals, cancel.clone()) {
            Ok(cli) => cli,
            Err(e) => return report(&self.streams.err, &cancel, &e.into()),
        };
        let cli = match &self.client {
            Some(client) => cli.with_client(client.clone()),
            None => cli,
        };

        // Plugins handle their own signals.
        if self.handle_signals && !matches!(subcommand, Commands::Plugin(_)) {
            tokio::spawn(watch_interrupts(cancel.clone()));
        }

        let path = command_path(&matches);
        let handler = dispatch(&cli, &path, subcommand);
        tokio::pin!(handler);
        let result = tokio::select! {
            result = &mut handler => result,
            _ = cancel.cancelled() => {
                match tokio::time::timeout(INTERRUPT_GRACE, &mut handler).await {
                    Ok(result) => result,
                    Err(_) => Err(CliError::Cancelled("context canceled".to_string()).into()),
                }
            }
        };
        match result {
            Ok(()) => 0,
            Err(e) => report(&cli.streams.err, &cancel, &e),
        }
    }

    async fn parse_failure(&self, err: clap::Error, argv: &[String]) -> i32 {
        match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                let help = self.help_text(argv).await;
                let mut out = self.streams.out.clone();
                let _ = write!(out, "{}", help);
                0
            }
            ClapErrorKind::DisplayVersion => {
                let mut out = self.streams.out.clone();
                let _ = write!(out, "{}", err.render());
                0
            }
            ClapErrorKind::MissingRequiredArgument => {
                let path = usage_path(argv);
                let mut out = self.streams.err.clone();
                let _ = writeln!(
                    out,
                    "\"docker {}\" requires 1 argument.\nSee 'docker {} --help'.",
                    path, path
                );
                EXIT_USAGE
            }
            _ => {
                let mut out = self.streams.err.clone();
                let _ = write!(out, "{}", err.render());
                EXIT_USAGE
            }
        }
    }

    /// Help for `argv`, with commands the daemon cannot serve left out and,
    /// at the root, the installed plugins listed.
    async fn help_text(&self, argv: &[String]) -> String {
        let (globals, rest) = scan_globals(argv);
        let mut command = root_command();
        match CliContext::new(self.streams.clone(), &globals, CancellationToken::new()) {
            Ok(cli) => {
                let cli = match &self.client {
                    Some(client) => cli.with_client(client.clone()),
                    None => cli,
                };
                match cli.ping().await {
                    Ok(ping) => command = gate::hide_unsupported(command, gate::GATES, &ping),
                    Err(e) => tracing::debug!("daemon unavailable for help: {}", e),
                }
                if rest.is_empty() {
                    if let Some(section) = plugins::help_section(&cli).await {
                        command = command.after_help(section);
                    }
                }
            }
            Err(e) => tracing::debug!("help without daemon information: {}", e),
        }

        let mut help_argv: Vec<String> = argv.iter().take(1).cloned().collect();
        help_argv.extend(rest);
        help_argv.push("--help".to_string());
        match command.try_get_matches_from_mut(&help_argv) {
            Err(e) => e.render().to_string(),
            Ok(_) => command.render_help().to_string(),
        }
    }
}

/// Root flags only; everything from the first subcommand on is kept raw.
#[derive(Parser)]
#[command(name = "docker", disable_help_flag = true, disable_version_flag = true)]
#[command(disable_help_subcommand = true)]
struct RootScan {
    #[command(flatten)]
    globals: GlobalOptions,

    #[command(subcommand)]
    rest: Option<ScanRest>,
}

#[derive(Subcommand)]
enum ScanRest {
    #[command(external_subcommand)]
    Other(Vec<String>),
}

/// Global flags and the subcommand path of a help request
fn scan_globals(argv: &[String]) -> (GlobalOptions, Vec<String>) {
    let stripped: Vec<&String> = argv
        .iter()
        .filter(|a| !matches!(a.as_str(), "-h" | "--help" | "-v" | "--version"))
        .collect();
    match RootScan::try_parse_from(stripped) {
        Ok(scan) => {
            let mut rest = match scan.rest {
                Some(ScanRest::Other(rest)) => rest,
                None => Vec::new(),
            };
            if rest.first().is_some_and(|r| r == "help") {
                rest.remove(0);
            }
            (scan.globals, rest)
        }
        Err(_) => (GlobalOptions::default(), Vec::new()),
    }
}

/// Subcommand path named by `argv`, aliases resolved, for usage messages
fn usage_path(argv: &[String]) -> String {
    let (_, rest) = scan_globals(argv);
    let mut command = Cli::command();
    let mut path = Vec::new();
    for token in rest {
        let Some(sub) = command.find_subcommand(&token).cloned() else {
            break;
        };
        path.push(sub.get_name().to_string());
        command = sub;
    }
    path.join(" ")
}

/// Names of the selected subcommands, outermost first
fn command_path(matches: &ArgMatches) -> Vec<String> {
    let mut path = Vec::new();
    let mut current = matches;
    while let Some((name, sub)) = current.subcommand() {
        path.push(name.to_string());
        current = sub;
    }
    path
}

async fn dispatch(cli: &CliContext, path: &[String], command: Commands) -> anyhow::Result<()> {
    if gate::is_gated(gate::GATES, path) {
        let ping = cli.ping().await?;
        gate::check(gate::GATES, path, &ping)?;
    }

    match command {
        Commands::Builder(args) => builder::execute(cli, args).await,
        Commands::Container(args) => container::execute(cli, args).await,
        Commands::Context(args) => context::execute(cli, args).await,
        Commands::Image(args) => image::execute(cli, args).await,
        Commands::Network(args) => network::execute(cli, args).await,
        Commands::System(args) => system::execute(cli, args).await,
        Commands::Volume(args) => volume::execute(cli, args).await,
        Commands::Attach(args) => exec::execute_attach(cli, args).await,
        Commands::Exec(args) => exec::execute(cli, args).await,
        Commands::Images(args) => images::execute(cli, args).await,
        Commands::Info(args) => system::execute_info(cli, args).await,
        Commands::Inspect(args) => inspect::execute(cli, args).await,
        Commands::Login(args) => login::execute(cli, args).await,
        Commands::Logout(args) => login::execute_logout(cli, args).await,
        Commands::Logs(args) => logs::execute(cli, args).await,
        Commands::Ps(args) => ps::execute(cli, args).await,
        Commands::Pull(args) => pull::execute(cli, args).await,
        Commands::Push(args) => push::execute(cli, args).await,
        Commands::Rm(args) => rm::execute(cli, args).await,
        Commands::Rmi(args) => rm::execute_rmi(cli, args).await,
        Commands::Run(args) => run::execute(cli, args).await,
        Commands::Start(args) => start::execute(cli, args).await,
        Commands::Stop(args) => stop::execute(cli, args).await,
        Commands::Tag(args) => tag::execute(cli, args).await,
        Commands::Version(args) => version::execute(cli, args).await,
        Commands::Plugin(args) => plugins::execute(cli, args).await,
    }
}

/// First signal cancels the command; the third exits immediately.
async fn watch_interrupts(cancel: CancellationToken) {
    let mut received = 0;
    while tokio::signal::ctrl_c().await.is_ok() {
        received += 1;
        tracing::debug!("interrupt {} received", received);
        cancel.cancel();
        if received >= FORCE_EXIT_AFTER {
            std::process::exit(EXIT_INTERRUPTED);
        }
    }
}

/// Print `err` and pick the exit code.
fn report(err_stream: &OutStream, cancel: &CancellationToken, err: &anyhow::Error) -> i32 {
    tracing::debug!("command failed: {:#}", err);

    let cli_error = err.chain().find_map(|e| e.downcast_ref::<CliError>());
    if let Some(e) = cli_error.filter(|e| e.kind() == ErrorKind::Cancelled) {
        let prompt = e.to_string() == PROMPT_TERMINATED;
        return if cancel.is_cancelled() && !prompt {
            EXIT_INTERRUPTED
        } else {
            0
        };
    }

    let message = err.to_string();
    if !message.is_empty() {
        let mut out = err_stream.clone();
        let _ = writeln!(out, "{}", message);
    }
    exit_code_for(err)
}

/// Usage error for commands given the wrong number of arguments
pub(crate) fn require_args(command: &str, given: usize, min: usize) -> crate::Result<()> {
    if given >= min {
        return Ok(());
    }
    let requirement = if min == 1 {
        "requires at least 1 argument".to_string()
    } else {
        format!("requires at least {} arguments", min)
    };
    Err(CliError::invalid_argument(format!(
        "\"docker {}\" {}.\nSee 'docker {} --help'.",
        command, requirement, command
    )))
}

/// Prune one content type, merging the configured default filters.
pub(crate) async fn prune_content(
    cli: &CliContext,
    content_type: &str,
    force: bool,
    all: bool,
    filter_flags: &[String],
) -> anyhow::Result<()> {
    let registry = prune::builtin_registry();
    let pruner = registry
        .get(content_type)
        .ok_or_else(|| CliError::system(format!("no pruner registered for {}", content_type)))?;

    let mut filters = Filters::from_flags(filter_flags)?;
    let defaults = Filters::from_flags(&cli.config.lock()?.prune_filters)?;
    filters.merge_defaults(&defaults);

    let client = cli.client().await?;
    let opts = PruneOptions {
        confirmed: false,
        all,
        filters,
    };
    prune::prune_one(pruner.as_ref(), client.as_ref(), &cli.streams, &cli.cancel, force, opts)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::testing::FakeDaemon;
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn argv(config: &TempDir, args: &[&str]) -> Vec<String> {
        let mut argv = vec![
            "docker".to_string(),
            format!("--config={}", config.path().display()),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    pub(crate) async fn run_against(
        daemon: Arc<FakeDaemon>,
        config: &TempDir,
        args: &[&str],
    ) -> (i32, String, String) {
        let (streams, out, err) = Streams::in_memory(tokio::io::empty());
        let code = Runner::new(streams)
            .with_client(daemon)
            .handle_signals(false)
            .run(argv(config, args))
            .await;
        (code, out.contents_string(), err.contents_string())
    }

    #[test]
    fn test_command_tree_is_valid() {
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn test_version_gate_blocks_old_daemon() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.40");
        daemon.ping.swarm = Some("active/manager".into());
        let daemon = Arc::new(daemon);

        let (code, _, err) =
            run_against(daemon.clone(), &dir, &["volume", "update", "--availability", "drain", "v1"]).await;
        assert_eq!(code, 1);
        assert!(err.contains("docker volume update"), "{}", err);
        assert!(err.contains("requires API version 1.42"), "{}", err);
        assert!(daemon.calls().is_empty());

        let (code, help, _) = run_against(daemon, &dir, &["volume", "--help"]).await;
        assert_eq!(code, 0);
        assert!(help.contains("prune"), "{}", help);
        assert!(!help.contains("update"), "{}", help);
    }

    #[tokio::test]
    async fn test_gated_command_listed_for_new_daemon() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.45");
        daemon.ping.swarm = Some("active/manager".into());
        let (code, help, _) = run_against(Arc::new(daemon), &dir, &["volume", "--help"]).await;
        assert_eq!(code, 0);
        assert!(help.contains("update"), "{}", help);
    }

    #[tokio::test]
    async fn test_usage_errors_exit_125() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon.clone(), &dir, &["ps", "--no-such-flag"]).await;
        assert_eq!(code, EXIT_USAGE);
        assert!(err.contains("--no-such-flag"), "{}", err);

        let (code, _, _) = run_against(daemon, &dir, &["container", "frobnicate"]).await;
        assert_eq!(code, EXIT_USAGE);
    }

    #[tokio::test]
    async fn test_version_flag() {
        let dir = TempDir::new().unwrap();
        let (code, out, _) = run_against(Arc::new(FakeDaemon::new("1.45")), &dir, &["-v"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, format!("Docker version {}\n", VERSION));
    }

    #[test]
    fn test_scan_globals_for_help() {
        let args: Vec<String> = ["docker", "--context", "remote", "help", "volume", "ls", "--help"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (globals, rest) = scan_globals(&args);
        assert_eq!(globals.context.as_deref(), Some("remote"));
        assert_eq!(rest, vec!["volume", "ls"]);
    }

    #[test]
    fn test_builtins_include_shortcuts_and_groups() {
        let names = builtin_names();
        for name in ["ps", "container", "context", "version"] {
            assert!(names.iter().any(|n| n == name), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_missing_positional_names_command() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon.clone(), &dir, &["image", "tag", "alpine"]).await;
        assert_eq!(code, 125);
        assert!(err.starts_with("\"docker image tag\" requires 1 argument."), "{}", err);
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_config_is_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("config.json")).unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon.clone(), &dir, &["ps"]).await;
        assert_eq!(code, 1);
        assert!(err.contains("loading config file"), "{}", err);
        assert!(daemon.calls().is_empty());
    }

    #[test]
    fn test_missing_argument_message() {
        let err = require_args("volume rm", 0, 1).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        assert!(err.to_string().contains("requires at least 1 argument"));
    }
}
