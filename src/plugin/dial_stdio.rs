//! `docker system dial-stdio`: the daemon connection over stdio
//!
//! The parent side proxies a raw daemon connection onto its own stdin and
//! stdout. The plugin side spawns the parent CLI with the same global
//! flags it was given, so both resolve the same context, TLS and config.

use super::ORIGINAL_CLI_COMMAND_ENV;
use crate::client::dialer::CommandConn;
use crate::{Result, APP_NAME};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Copy `stdin` into `conn` and `conn` into `stdout` until the daemon side
/// is done.
///
/// Each direction half-closes its destination at EOF. The session ends when
/// the daemon closes; if stdin ends first, the daemon's remaining output is
/// still delivered.
pub async fn proxy<C, R, W>(conn: C, mut stdin: R, mut stdout: W) -> Result<()>
where
    C: AsyncRead + AsyncWrite + Send,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (mut conn_r, mut conn_w) = tokio::io::split(conn);

    let stdin_to_conn = async {
        let copied = tokio::io::copy(&mut stdin, &mut conn_w).await;
        tracing::debug!("stdin to daemon finished: {:?}", copied);
        let shutdown = conn_w.shutdown().await;
        copied.and(shutdown)
    };
    let conn_to_stdout = async {
        let copied = tokio::io::copy(&mut conn_r, &mut stdout).await;
        tracing::debug!("daemon to stdout finished: {:?}", copied);
        let shutdown = stdout.shutdown().await;
        copied.and(shutdown)
    };
    tokio::pin!(stdin_to_conn, conn_to_stdout);

    tokio::select! {
        result = &mut stdin_to_conn => {
            result?;
            conn_to_stdout.await?;
        }
        result = &mut conn_to_stdout => {
            result?;
        }
    }
    Ok(())
}

/// Arguments for the parent CLI: the global flags that preceded the
/// plugin's name, then `system dial-stdio`.
pub fn dial_stdio_args(plugin_args: &[String], plugin_name: &str) -> Vec<String> {
    let mut args: Vec<String> = plugin_args
        .iter()
        .take_while(|a| a.as_str() != plugin_name)
        .cloned()
        .collect();
    args.push("system".to_string());
    args.push("dial-stdio".to_string());
    args
}

/// Plugin side: open a daemon connection through the parent CLI.
///
/// `plugin_args` is the plugin's own argv without the program name.
pub fn connect_through_cli(plugin_args: &[String], plugin_name: &str) -> Result<CommandConn> {
    let program = std::env::var(ORIGINAL_CLI_COMMAND_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| APP_NAME.to_string());
    CommandConn::spawn(&program, &dial_stdio_args(plugin_args, plugin_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_global_flags_kept_before_subcommand() {
        let argv: Vec<String> = ["--config=X", "--log-level=debug", "foo", "ls", "-a"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            dial_stdio_args(&argv, "foo"),
            vec!["--config=X", "--log-level=debug", "system", "dial-stdio"]
        );
    }

    #[tokio::test]
    async fn test_proxy_half_closes_each_direction() {
        let (conn, mut daemon) = tokio::io::duplex(1024);
        let (stdout_w, mut stdout_r) = tokio::io::duplex(1024);

        let daemon_side = tokio::spawn(async move {
            let mut request = Vec::new();
            daemon.read_to_end(&mut request).await.unwrap();
            daemon.write_all(b"pong:").await.unwrap();
            daemon.write_all(&request).await.unwrap();
            daemon.shutdown().await.unwrap();
        });

        proxy(conn, &b"ping"[..], stdout_w).await.unwrap();
        daemon_side.await.unwrap();

        let mut got = Vec::new();
        stdout_r.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"pong:ping");
    }

    #[tokio::test]
    async fn test_daemon_close_ends_session_while_stdin_open() {
        let (conn, mut daemon) = tokio::io::duplex(1024);
        let (_stdin_keepalive, stdin) = tokio::io::duplex(16);
        let (stdout_w, mut stdout_r) = tokio::io::duplex(1024);

        tokio::spawn(async move {
            daemon.write_all(b"bye").await.unwrap();
            drop(daemon);
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), proxy(conn, stdin, stdout_w))
            .await
            .unwrap()
            .unwrap();
        let mut got = Vec::new();
        stdout_r.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"bye");
    }

    #[tokio::test]
    async fn test_connect_through_cli_runs_dial_stdio() {
        let dir = tempfile::TempDir::new().unwrap();
        let fake_cli = crate::plugin::manager::tests::write_script(
            dir.path(),
            "fake-docker",
            "printf '%s ' \"$@\"",
        );
        std::env::set_var(ORIGINAL_CLI_COMMAND_ENV, &fake_cli);
        let argv: Vec<String> = ["--config=X", "--log-level=debug", "foo", "ls"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut conn = connect_through_cli(&argv, "foo").unwrap();
        std::env::remove_var(ORIGINAL_CLI_COMMAND_ENV);

        let mut out = String::new();
        conn.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "--config=X --log-level=debug system dial-stdio ");
    }
}
