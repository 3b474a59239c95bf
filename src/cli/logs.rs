//! `docker logs` command implementation

use super::CliContext;
use crate::client::api::LogsOptions;
use crate::hijack::stdcopy;
use crate::opts::units::parse_duration;
use clap::Args;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncReadExt;

/// Arguments for the `logs` command
#[derive(Args)]
pub struct LogsArgs {
    /// Container name or ID
    pub container: String,

    /// Show extra details provided to logs
    #[arg(long)]
    pub details: bool,

    /// Follow log output
    #[arg(short, long)]
    pub follow: bool,

    /// Show logs since timestamp (e.g., 2013-01-02T13:23:37Z) or relative (e.g., 42m)
    #[arg(long)]
    pub since: Option<String>,

    /// Number of lines to show from the end of the logs
    #[arg(short = 'n', long, default_value = "all")]
    pub tail: String,

    /// Show timestamps
    #[arg(short, long)]
    pub timestamps: bool,

    /// Show logs before a timestamp or relative time
    #[arg(long)]
    pub until: Option<String>,
}

/// Relative durations become absolute unix timestamps; anything else is
/// passed to the daemon as written.
fn timestamp_arg(value: &str, now: SystemTime) -> String {
    match parse_duration(value) {
        Ok(ago) => {
            let at = now.checked_sub(ago).unwrap_or(UNIX_EPOCH);
            let secs = at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
            secs.to_string()
        }
        Err(_) => value.to_string(),
    }
}

/// Execute the `logs` command
pub async fn execute(cli: &CliContext, args: LogsArgs) -> anyhow::Result<()> {
    let client = cli.client().await?;
    let (container, _) = client.container_inspect_raw(&args.container).await?;
    let tty = container["Config"]["Tty"].as_bool().unwrap_or(false);

    let now = SystemTime::now();
    let opts = LogsOptions {
        follow: args.follow,
        timestamps: args.timestamps,
        details: args.details,
        tail: args.tail,
        since: args.since.as_deref().map(|v| timestamp_arg(v, now)),
        until: args.until.as_deref().map(|v| timestamp_arg(v, now)),
        stdout: true,
        stderr: true,
    };
    let mut body = client.container_logs(&args.container, &opts).await?;

    let mut out = cli.streams.out.clone();
    if tty {
        let mut buf = vec![0u8; 32 * 1024];
        loop {
            let n = body.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        out.flush()?;
    } else {
        let mut err = cli.streams.err.clone();
        stdcopy::demux(&mut body, &mut out, &mut err).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use crate::hijack::stdcopy::{encode_frame, STDERR, STDOUT};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_relative_since_becomes_timestamp() {
        let now = UNIX_EPOCH + Duration::from_secs(10_000);
        assert_eq!(timestamp_arg("10s", now), "9990");
        assert_eq!(timestamp_arg("2013-01-02T13:23:37Z", now), "2013-01-02T13:23:37Z");
    }

    #[tokio::test]
    async fn test_non_tty_logs_are_demultiplexed() {
        let dir = TempDir::new().unwrap();
        let mut body = encode_frame(STDOUT, b"out line\n");
        body.extend(encode_frame(STDERR, b"err line\n"));
        let mut daemon = FakeDaemon::new("1.45").with_object("web", json!({"Config": {"Tty": false}}));
        daemon.stream = body;
        let (code, out, err) = run_against(Arc::new(daemon), &dir, &["logs", "web"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "out line\n");
        assert_eq!(err, "err line\n");
    }

    #[tokio::test]
    async fn test_tty_logs_are_copied_raw() {
        let dir = TempDir::new().unwrap();
        let mut daemon = FakeDaemon::new("1.45").with_object("web", json!({"Config": {"Tty": true}}));
        daemon.stream = b"\x1b[1mbold\x1b[0m\r\n".to_vec();
        let (code, out, _) =
            run_against(Arc::new(daemon), &dir, &["container", "logs", "web"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "\x1b[1mbold\x1b[0m\r\n");
    }

    #[tokio::test]
    async fn test_missing_container() {
        let dir = TempDir::new().unwrap();
        let (code, _, err) =
            run_against(Arc::new(FakeDaemon::new("1.45")), &dir, &["logs", "ghost"]).await;
        assert_eq!(code, 1);
        assert!(err.contains("No such object: ghost"), "{}", err);
    }
}
