//! Credentials held by an external `docker-credential-<helper>` program

use super::{CredentialStore, FileStore};
use crate::registry::auth::AuthConfig;
use crate::{CliError, Result, APP_NAME};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Wall-clock budget for one helper invocation
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(30);

const NOT_FOUND_MESSAGE: &str = "credentials not found in native keychain";

/// Username a helper reports when `Secret` is an identity token
const TOKEN_USERNAME: &str = "<token>";

#[derive(Debug, Serialize, Deserialize)]
struct HelperCredentials {
    #[serde(rename = "ServerURL", default)]
    server_url: String,
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Secret", default)]
    secret: String,
}

/// Credential store delegating to a helper program.
///
/// Entries the helper knows nothing about fall back to the file store, so
/// `get_all` reports both.
pub struct NativeStore {
    helper: String,
    program: PathBuf,
    file_store: FileStore,
}

impl NativeStore {
    /// Store using `docker-credential-<helper>` from `PATH`
    pub fn new(helper: &str, file_store: FileStore) -> Self {
        Self {
            helper: helper.to_string(),
            program: PathBuf::from(format!("{}-credential-{}", APP_NAME, helper)),
            file_store,
        }
    }

    /// Store using an explicit helper binary
    pub fn with_program(helper: &str, program: impl Into<PathBuf>, file_store: FileStore) -> Self {
        Self {
            helper: helper.to_string(),
            program: program.into(),
            file_store,
        }
    }

    /// Run `<program> <action>` with `input` on stdin; returns stdout.
    async fn run(&self, action: &str, input: &[u8]) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .arg(action)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CliError::system(format!(
                    "error getting credentials - err: exec: \"{}\": {}",
                    self.program.display(),
                    e
                ))
            })?;

        // A helper may exit without reading its input.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(input).await {
                tracing::debug!("credential helper {} closed stdin early: {}", self.helper, e);
            }
        }

        let output = tokio::time::timeout(HELPER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                CliError::system(format!(
                    "credential helper {} timed out after {}s",
                    self.helper,
                    HELPER_TIMEOUT.as_secs()
                ))
            })??;

        if !output.status.success() {
            let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
            let err = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if out.is_empty() { err } else { out };
            if message == NOT_FOUND_MESSAGE {
                return Err(CliError::not_found(message));
            }
            return Err(CliError::system(format!(
                "error {} credentials with helper {} - err: {}, out: `{}`",
                action_verb(action),
                self.helper,
                output.status,
                message
            )));
        }

        Ok(output.stdout)
    }

    async fn get_from_helper(&self, server: &str) -> Result<AuthConfig> {
        let stdout = match self.run("get", server.as_bytes()).await {
            Ok(out) => out,
            Err(CliError::NotFound(_)) => {
                return Ok(AuthConfig {
                    server_address: server.to_string(),
                    ..Default::default()
                })
            }
            Err(e) => return Err(e),
        };

        let creds: HelperCredentials = serde_json::from_slice(&stdout).map_err(|e| {
            CliError::system(format!(
                "credential helper {} returned invalid output: {}",
                self.helper, e
            ))
        })?;

        let mut auth = AuthConfig {
            server_address: server.to_string(),
            ..Default::default()
        };
        if creds.username == TOKEN_USERNAME {
            auth.identity_token = creds.secret;
        } else {
            auth.username = creds.username;
            auth.password = creds.secret;
        }
        Ok(auth)
    }
}

fn action_verb(action: &str) -> &'static str {
    match action {
        "get" => "getting",
        "store" => "storing",
        "erase" => "erasing",
        _ => "listing",
    }
}

#[async_trait]
impl CredentialStore for NativeStore {
    async fn get(&self, server: &str) -> Result<AuthConfig> {
        let auth = self.get_from_helper(server).await?;
        if auth.is_empty() {
            return self.file_store.get(server).await;
        }
        Ok(auth)
    }

    async fn get_all(&self) -> Result<BTreeMap<String, AuthConfig>> {
        let mut all = self.file_store.get_all().await?;
        let stdout = self.run("list", b"").await?;
        let listed: BTreeMap<String, String> = serde_json::from_slice(&stdout)?;
        for server in listed.keys() {
            let auth = self.get_from_helper(server).await?;
            all.insert(server.clone(), auth);
        }
        Ok(all)
    }

    async fn store(&self, auth: &AuthConfig) -> Result<()> {
        let creds = if auth.identity_token.is_empty() {
            HelperCredentials {
                server_url: auth.server_address.clone(),
                username: auth.username.clone(),
                secret: auth.password.clone(),
            }
        } else {
            HelperCredentials {
                server_url: auth.server_address.clone(),
                username: TOKEN_USERNAME.to_string(),
                secret: auth.identity_token.clone(),
            }
        };
        let payload = serde_json::to_vec(&creds)?;
        self.run("store", &payload).await?;
        Ok(())
    }

    async fn erase(&self, server: &str) -> Result<()> {
        match self.run("erase", server.as_bytes()).await {
            Ok(_) | Err(CliError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.file_store.erase(server).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::paths::CliPaths;
    use crate::config::ConfigStore;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_helper(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("docker-credential-fake");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn store_with(tmp: &TempDir, program: PathBuf) -> NativeStore {
        let config = Arc::new(ConfigStore::new(CliPaths::with_root(tmp.path())));
        NativeStore::with_program("fake", program, FileStore::new(config))
    }

    #[tokio::test]
    async fn test_get_parses_helper_output() {
        let tmp = TempDir::new().unwrap();
        let helper = write_helper(
            tmp.path(),
            r#"read server; echo "{\"ServerURL\":\"$server\",\"Username\":\"bob\",\"Secret\":\"s3cret\"}""#,
        );
        let store = store_with(&tmp, helper);

        let auth = store.get("registry.example.com").await.unwrap();
        assert_eq!(auth.username, "bob");
        assert_eq!(auth.password, "s3cret");
        assert_eq!(auth.server_address, "registry.example.com");
    }

    #[tokio::test]
    async fn test_token_username_means_identity_token() {
        let tmp = TempDir::new().unwrap();
        let helper = write_helper(
            tmp.path(),
            r#"echo '{"ServerURL":"r","Username":"<token>","Secret":"idtok"}'"#,
        );
        let store = store_with(&tmp, helper);

        let auth = store.get("r").await.unwrap();
        assert_eq!(auth.identity_token, "idtok");
        assert!(auth.username.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_yields_zero_entry() {
        let tmp = TempDir::new().unwrap();
        let helper = write_helper(
            tmp.path(),
            "echo 'credentials not found in native keychain'; exit 1",
        );
        let store = store_with(&tmp, helper);

        let auth = store.get("r").await.unwrap();
        assert!(auth.is_empty());
    }

    #[tokio::test]
    async fn test_helper_failure_names_helper() {
        let tmp = TempDir::new().unwrap();
        let helper = write_helper(tmp.path(), "echo 'keychain locked' >&2; exit 3");
        let store = store_with(&tmp, helper);

        let err = store.get("r").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("fake"), "{}", message);
        assert!(message.contains("keychain locked"), "{}", message);
    }
}
