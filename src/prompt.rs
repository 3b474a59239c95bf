//! Confirmation prompts and password entry

use crate::streams::{InStream, OutStream};
use crate::{CliError, Result};
use std::io::Write;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Error message used when a prompt is interrupted
pub const PROMPT_TERMINATED: &str = "prompt terminated";

/// Read one line from `input` without consuming anything past the newline.
///
/// Returns `None` on EOF before any byte was read. The trailing `\n` and an
/// optional `\r` before it are stripped.
pub async fn read_line(input: &InStream) -> Result<Option<String>> {
    let mut reader = input.lock().await;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Ask a yes/no question. Only `y` and `yes` (any case) confirm.
///
/// Cancelling `cancel` while waiting returns [`CliError::Cancelled`]; EOF on
/// the input counts as "no". Both end the prompt line with a newline.
pub async fn confirm(
    cancel: &CancellationToken,
    input: &InStream,
    out: &mut OutStream,
    message: &str,
) -> Result<bool> {
    write!(out, "{} [y/N] ", message)?;
    out.flush()?;

    let answer = tokio::select! {
        _ = cancel.cancelled() => {
            writeln!(out)?;
            return Err(CliError::Cancelled(PROMPT_TERMINATED.to_string()));
        }
        line = read_line(input) => line?,
    };

    match answer {
        Some(answer) => {
            let answer = answer.trim().to_lowercase();
            Ok(answer == "y" || answer == "yes")
        }
        None => {
            writeln!(out)?;
            Ok(false)
        }
    }
}

/// Read a value with local echo disabled on terminals.
pub async fn read_password(
    cancel: &CancellationToken,
    input: &InStream,
    out: &mut OutStream,
    label: &str,
) -> Result<String> {
    write!(out, "{}", label)?;
    out.flush()?;

    #[cfg(unix)]
    let echo_guard = match input.fd() {
        Some(fd) if input.is_terminal() => Some(crate::streams::term::EchoGuard::disable(fd)?),
        _ => None,
    };

    let line = tokio::select! {
        _ = cancel.cancelled() => None,
        line = read_line(input) => Some(line),
    };

    #[cfg(unix)]
    let had_guard = echo_guard.is_some();
    #[cfg(unix)]
    drop(echo_guard);
    #[cfg(not(unix))]
    let had_guard = false;

    // ECHONL already echoed the newline on terminals.
    if !had_guard {
        writeln!(out)?;
    }

    match line {
        None => Err(CliError::Cancelled(PROMPT_TERMINATED.to_string())),
        Some(line) => Ok(line?.unwrap_or_default()),
    }
}

/// Interpret a boolean-like environment value. Unset or empty yields `None`.
pub fn parse_bool_env(value: Option<&str>) -> Option<bool> {
    match value.map(str::trim) {
        None | Some("") => None,
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
            "0" | "f" | "false" | "n" | "no" | "off" => Some(false),
            _ => None,
        },
    }
}
