//! `docker login` and `docker logout`

use super::CliContext;
use crate::registry::auth::{AuthConfig, IndexInfo, INDEX_SERVER};
use crate::registry::login::{
    credentials_to_store, hints_enabled, prompt_for_credentials, CredentialPrompt,
};
use crate::{CliError, ErrorKind};
use clap::Args;
use std::io::Write;
use tokio::io::AsyncReadExt;

/// Arguments for the `login` command
#[derive(Args)]
pub struct LoginArgs {
    /// Registry server; defaults to the official index
    pub server: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Take the password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

/// Arguments for the `logout` command
#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server; defaults to the official index
    pub server: Option<String>,
}

fn server_address(server: Option<&str>) -> (IndexInfo, String) {
    match server.filter(|s| !s.is_empty()) {
        Some(server) => {
            let index = IndexInfo::new(server);
            let address = if index.official {
                INDEX_SERVER.to_string()
            } else {
                server.to_string()
            };
            (index, address)
        }
        None => (IndexInfo::official(), INDEX_SERVER.to_string()),
    }
}

async fn password_from_stdin(cli: &CliContext) -> crate::Result<String> {
    let mut data = String::new();
    cli.streams.input.lock().await.read_to_string(&mut data).await?;
    Ok(data.trim_end_matches(['\n', '\r']).to_string())
}

/// Execute the `login` command
pub async fn execute(cli: &CliContext, args: LoginArgs) -> anyhow::Result<()> {
    let mut password = args.password;
    if args.password_stdin {
        if password.is_some() {
            return Err(
                CliError::invalid_argument("--password and --password-stdin are mutually exclusive")
                    .into(),
            );
        }
        if args.username.as_deref().unwrap_or_default().is_empty() {
            return Err(CliError::invalid_argument("Must provide --username with --password-stdin").into());
        }
        let typed = password_from_stdin(cli).await?;
        if typed.is_empty() {
            return Err(CliError::invalid_argument("Error: Password Required").into());
        }
        password = Some(typed);
    } else if password.is_some() {
        writeln!(
            cli.streams.err.clone(),
            "WARNING! Using --password via the CLI is insecure. Use --password-stdin."
        )?;
    }

    let (index, address) = server_address(args.server.as_deref());
    let client = cli.client().await?;
    let stored = cli.credentials.resolve(&index).await.unwrap_or_default();

    // Stored credentials are tried first when nothing was given on the command line.
    let interactive = args.username.is_none() && password.is_none();
    if interactive && !stored.is_empty() {
        let mut auth = stored.clone();
        auth.server_address = address.clone();
        match client.registry_login(&auth).await {
            Ok(response) => {
                return finish(cli, auth, &response.identity_token, &response.status).await;
            }
            Err(e) if e.kind() == ErrorKind::Unauthorized => {
                tracing::debug!("stored credentials for {} rejected: {}", address, e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut streams = cli.streams.clone();
    let auth = prompt_for_credentials(
        &cli.cancel,
        &mut streams,
        CredentialPrompt {
            index: Some(index),
            server_address: address,
            username: args.username,
            password,
            last_username: stored.username,
            hints: hints_enabled(),
        },
    )
    .await?;
    let response = client.registry_login(&auth).await?;
    finish(cli, auth, &response.identity_token, &response.status).await
}

async fn finish(
    cli: &CliContext,
    auth: AuthConfig,
    identity_token: &str,
    status: &str,
) -> anyhow::Result<()> {
    let auth = credentials_to_store(auth, Some(identity_token));
    if let Err(e) = cli.credentials.store(&auth).await {
        return Err(CliError::system(format!("Error saving credentials: {}", e)).into());
    }
    let status = if status.is_empty() { "Login Succeeded" } else { status };
    writeln!(cli.streams.out.clone(), "{}", status)?;
    Ok(())
}

/// Execute the `logout` command
pub async fn execute_logout(cli: &CliContext, args: LogoutArgs) -> anyhow::Result<()> {
    let (_, address) = server_address(args.server.as_deref());
    writeln!(cli.streams.out.clone(), "Removing login credentials for {}", address)?;
    if let Err(e) = cli.credentials.erase(&address).await {
        writeln!(
            cli.streams.err.clone(),
            "WARNING: could not erase credentials for {}: {}",
            address, e
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::testing::FakeDaemon;
    use crate::cli::tests::run_against;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_server_address() {
        assert_eq!(server_address(None).1, INDEX_SERVER);
        assert_eq!(server_address(Some("docker.io")).1, INDEX_SERVER);
        let (index, address) = server_address(Some("registry.example.com:5000"));
        assert!(!index.official);
        assert_eq!(address, "registry.example.com:5000");
    }

    #[tokio::test]
    async fn test_login_with_flags_stores_credentials() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, out, err) = run_against(
            daemon.clone(),
            &dir,
            &["login", "-u", "alice", "-p", "s3cret", "registry.example.com"],
        )
        .await;
        assert_eq!(code, 0, "{}", err);
        assert_eq!(out, "Login Succeeded\n");
        assert!(err.contains("--password via the CLI is insecure"), "{}", err);
        assert_eq!(daemon.calls(), vec!["login registry.example.com alice"]);

        let config = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(config.contains("registry.example.com"), "{}", config);

        let (code, out, _) =
            run_against(daemon, &dir, &["logout", "registry.example.com"]).await;
        assert_eq!(code, 0);
        assert_eq!(out, "Removing login credentials for registry.example.com\n");
        let config = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(!config.contains("registry.example.com"), "{}", config);
    }

    #[tokio::test]
    async fn test_password_stdin_needs_username() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(daemon.clone(), &dir, &["login", "--password-stdin"]).await;
        assert_eq!(code, 125);
        assert!(err.contains("Must provide --username"), "{}", err);
        assert!(daemon.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_stdin_password_rejected() {
        let dir = TempDir::new().unwrap();
        let daemon = Arc::new(FakeDaemon::new("1.45"));
        let (code, _, err) = run_against(
            daemon.clone(),
            &dir,
            &["login", "-u", "bob", "--password-stdin", "registry.example.com"],
        )
        .await;
        assert_eq!(code, 125);
        assert!(err.contains("Password Required"), "{}", err);
        assert!(daemon.calls().is_empty());
    }
}
