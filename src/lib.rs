//! docker-cli - command-line front-end for a remote container engine
//!
//! This crate provides the platform shared by every resource subcommand:
//! connection and context resolution, registry credentials, hijacked stream
//! I/O, progress rendering, output formatting and the CLI plugin host.

pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod formatter;
pub mod hijack;
pub mod inspect;
pub mod jsonmessage;
pub mod opts;
pub mod plugin;
pub mod prompt;
pub mod prune;
pub mod registry;
pub mod streams;

use thiserror::Error;

/// Classification carried by every [`CliError`], independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Cancelled,
    NotImplemented,
    System,
    Template,
}

/// Main error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Cancelled(String),

    #[error("{0}")]
    NotImplemented(String),

    #[error("{0}")]
    System(String),

    #[error("template: {0}")]
    Template(String),

    /// A command whose exit status comes from the daemon (container exit
    /// codes) or from a plugin process.
    #[error("{message}")]
    Status { message: String, code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::Template(_) => ErrorKind::Template,
            Self::System(_) | Self::Status { .. } | Self::Io(_) | Self::Json(_) => {
                ErrorKind::System
            }
        }
    }

    /// Process exit code for this error when it reaches the root command
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Status { code, .. } => *code,
            _ => match self.kind() {
                ErrorKind::InvalidArgument => EXIT_USAGE,
                ErrorKind::Cancelled => 0,
                ErrorKind::Template => EXIT_TEMPLATE,
                _ => 1,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Find the classification of an `anyhow` chain, if any layer carries one.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|e| e.downcast_ref::<CliError>())
        .map(CliError::kind)
}

/// Exit code for an error chain reaching the root command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<CliError>())
        .map(CliError::exit_code)
        .unwrap_or(1)
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name, also the binary prefix for plugins and credential helpers
pub const APP_NAME: &str = "docker";

/// Exit code for CLI-layer failures (unknown flag, validation error)
pub const EXIT_USAGE: i32 = 125;

/// Exit code when a plugin exists but cannot be executed
pub const EXIT_PLUGIN_NOT_EXECUTABLE: i32 = 126;

/// Exit code for an unknown plugin or command
pub const EXIT_UNKNOWN_COMMAND: i32 = 127;

/// Exit code for template parse errors
pub const EXIT_TEMPLATE: i32 = 64;

/// Exit code after SIGINT interrupted a stream
pub const EXIT_INTERRUPTED: i32 = 130;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_classification() {
        assert_eq!(CliError::invalid_argument("x").exit_code(), 125);
        assert_eq!(CliError::not_found("x").exit_code(), 1);
        assert_eq!(CliError::Template("bad".into()).exit_code(), 64);
        assert_eq!(CliError::Cancelled("stop".into()).exit_code(), 0);
        assert_eq!(
            CliError::Status {
                message: String::new(),
                code: 42
            }
            .exit_code(),
            42
        );
    }

    #[test]
    fn test_exit_code_found_through_context() {
        let err = anyhow::Error::new(CliError::invalid_argument("bad flag"))
            .context("while parsing");
        assert_eq!(exit_code_for(&err), 125);
        assert_eq!(error_kind(&err), Some(ErrorKind::InvalidArgument));

        let plain = anyhow::anyhow!("boom");
        assert_eq!(exit_code_for(&plain), 1);
        assert_eq!(error_kind(&plain), None);
    }
}
