//! Interactive credential prompting for `login` and auth-retrying pulls

use super::auth::{AuthConfig, IndexInfo};
use crate::prompt::{parse_bool_env, read_line, read_password};
use crate::streams::Streams;
use crate::{CliError, Result};
use std::io::Write;
use tokio_util::sync::CancellationToken;

/// Environment switch for contextual suggestions
pub const HINTS_ENV: &str = "DOCKER_CLI_HINTS";

const HUB_EXPLAINER: &str = "Log in with your Docker ID or email address to push and pull images from Docker Hub. If you don't have a Docker ID, head over to https://hub.docker.com/ to create one.";

const PAT_HINT: &str = "You can log in with your password or a Personal Access Token (PAT). Using a limited-scope PAT grants better security and is required for organizations using SSO. Learn more at https://docs.docker.com/go/access-tokens/";

/// Whether contextual hints may be printed
pub fn hints_enabled() -> bool {
    parse_bool_env(std::env::var(HINTS_ENV).ok().as_deref()).unwrap_or(true)
}

/// What is already known before prompting
#[derive(Debug, Clone, Default)]
pub struct CredentialPrompt {
    pub index: Option<IndexInfo>,
    pub server_address: String,
    /// Username given on the command line; skips the username prompt.
    pub username: Option<String>,
    /// Password given on the command line or stdin; skips the password prompt.
    pub password: Option<String>,
    /// Username from the stored entry for this registry
    pub last_username: String,
    pub hints: bool,
}

/// Prompt for whatever part of the credentials is still missing.
pub async fn prompt_for_credentials(
    cancel: &CancellationToken,
    streams: &mut Streams,
    request: CredentialPrompt,
) -> Result<AuthConfig> {
    let official = request.index.as_ref().is_some_and(|i| i.official);

    let username = match request.username.map(|u| u.trim().to_string()) {
        Some(username) if !username.is_empty() => username,
        _ => {
            if official {
                writeln!(streams.out, "{}", HUB_EXPLAINER)?;
                if request.hints {
                    writeln!(streams.out, "{}", PAT_HINT)?;
                }
                writeln!(streams.out)?;
            }

            if request.last_username.is_empty() {
                write!(streams.out, "Username: ")?;
            } else {
                write!(streams.out, "Username ({}): ", request.last_username)?;
            }
            streams.out.flush()?;

            let typed = tokio::select! {
                _ = cancel.cancelled() => {
                    writeln!(streams.out)?;
                    return Err(CliError::Cancelled(crate::prompt::PROMPT_TERMINATED.to_string()));
                }
                line = read_line(&streams.input) => line?.unwrap_or_default(),
            };
            let typed = typed.trim().to_string();
            if typed.is_empty() {
                request.last_username.clone()
            } else {
                typed
            }
        }
    };
    if username.is_empty() {
        return Err(CliError::invalid_argument("Error: Non-null Username Required"));
    }

    let password = match request.password {
        Some(password) if !password.is_empty() => password,
        _ => read_password(cancel, &streams.input, &mut streams.out, "Password: ").await?,
    };
    if password.is_empty() {
        return Err(CliError::invalid_argument("Error: Password Required"));
    }

    Ok(AuthConfig {
        username,
        password,
        server_address: request.server_address,
        ..Default::default()
    })
}

/// Merge the daemon's login response into the credentials to persist.
///
/// An identity token replaces the password so only one secret is stored.
pub fn credentials_to_store(mut auth: AuthConfig, identity_token: Option<&str>) -> AuthConfig {
    if let Some(token) = identity_token.filter(|t| !t.is_empty()) {
        auth.password.clear();
        auth.identity_token = token.to_string();
    }
    auth
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(index: IndexInfo) -> CredentialPrompt {
        CredentialPrompt {
            server_address: index.auth_key(),
            index: Some(index),
            hints: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_official_index_prints_explainer_and_hint() {
        let (mut streams, out, _) = Streams::in_memory(&b"alice\nhunter2\n"[..]);
        let auth = prompt_for_credentials(
            &CancellationToken::new(),
            &mut streams,
            request(IndexInfo::official()),
        )
        .await
        .unwrap();

        assert_eq!(auth.username, "alice");
        assert_eq!(auth.password, "hunter2");
        assert_eq!(auth.server_address, "https://index.docker.io/v1/");
        let printed = out.contents_string();
        assert!(printed.contains("Docker ID"));
        assert!(printed.contains("Personal Access Token"));
    }

    #[tokio::test]
    async fn test_private_registry_no_explainer_and_default_username() {
        let (mut streams, out, _) = Streams::in_memory(&b"\npw\n"[..]);
        let mut req = request(IndexInfo::new("registry.example.com"));
        req.last_username = "bob".into();

        let auth = prompt_for_credentials(&CancellationToken::new(), &mut streams, req)
            .await
            .unwrap();
        assert_eq!(auth.username, "bob");
        let printed = out.contents_string();
        assert!(!printed.contains("Docker ID"));
        assert!(printed.starts_with("Username (bob): "));
    }

    #[tokio::test]
    async fn test_blank_password_rejected() {
        let (mut streams, _, _) = Streams::in_memory(&b"\n"[..]);
        let mut req = request(IndexInfo::new("registry.example.com"));
        req.username = Some("carol".into());

        let err = prompt_for_credentials(&CancellationToken::new(), &mut streams, req)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: Password Required");
    }

    #[tokio::test]
    async fn test_hint_suppressed() {
        let (mut streams, out, _) = Streams::in_memory(&b"u\np\n"[..]);
        let mut req = request(IndexInfo::official());
        req.hints = false;
        prompt_for_credentials(&CancellationToken::new(), &mut streams, req)
            .await
            .unwrap();
        assert!(!out.contents_string().contains("Personal Access Token"));
    }

    #[test]
    fn test_identity_token_replaces_password() {
        let auth = AuthConfig {
            username: "u".into(),
            password: "p".into(),
            ..Default::default()
        };
        let stored = credentials_to_store(auth.clone(), Some("tok"));
        assert!(stored.password.is_empty());
        assert_eq!(stored.identity_token, "tok");
        assert_eq!(credentials_to_store(auth, None).password, "p");
    }
}
