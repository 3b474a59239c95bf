//! Renderer for the daemon's newline-delimited JSON progress events
//!
//! Pull, push, build and prune endpoints stream one JSON object per line.
//! On a terminal, rows that carry an `id` are rewritten in place; otherwise
//! every event becomes one line of log output.

use crate::opts::units::human_size;
use crate::streams::OutStream;
use crate::{CliError, Result};
use crossterm::cursor::{MoveDown, MoveUp};
use crossterm::terminal::{Clear, ClearType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

const BAR_WIDTH: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDetail {
    #[serde(default)]
    pub current: i64,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// One event of a progress stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_detail: Option<ProgressDetail>,
    /// Pre-rendered progress text sent by older daemons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<JsonError>,
    /// Legacy error text, superseded by `error_detail`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux: Option<Value>,
}

impl JsonMessage {
    fn failure(&self) -> Option<JsonError> {
        match (&self.error_detail, &self.error) {
            (Some(detail), _) => Some(detail.clone()),
            (None, Some(message)) => Some(JsonError {
                code: 0,
                message: message.clone(),
            }),
            _ => None,
        }
    }

    fn is_progress(&self) -> bool {
        self.id.is_some() && (self.progress_detail.is_some() || self.progress.is_some())
    }

    /// Text of this event without cursor control or line ending
    pub fn render(&self, terminal: bool) -> String {
        if let Some(err) = self.failure() {
            return err.message;
        }
        let mut line = String::new();
        if let Some(id) = &self.id {
            line.push_str(id);
            line.push_str(": ");
        }
        if let Some(status) = &self.status {
            line.push_str(status);
        }
        if terminal {
            let bar = match (&self.progress_detail, &self.progress) {
                (Some(detail), _) if detail.total > 0 || detail.current > 0 => {
                    progress_bar(detail)
                }
                (_, Some(text)) => text.clone(),
                _ => String::new(),
            };
            if !bar.is_empty() {
                if self.status.is_some() {
                    line.push(' ');
                }
                line.push_str(&bar);
            }
        }
        line
    }
}

fn progress_bar(detail: &ProgressDetail) -> String {
    let current = detail.current.max(0) as u64;
    if detail.total <= 0 {
        return human_size(current);
    }
    let total = detail.total as u64;
    let filled = ((current.min(total) as f64 / total as f64) * BAR_WIDTH as f64) as usize;
    let bar = if filled >= BAR_WIDTH {
        "=".repeat(BAR_WIDTH)
    } else {
        format!("{}>{}", "=".repeat(filled), " ".repeat(BAR_WIDTH - filled - 1))
    };
    format!("[{}] {}/{}", bar, human_size(current), human_size(total))
}

fn to_error(err: JsonError) -> CliError {
    match err.code {
        401 => CliError::Unauthorized(err.message),
        403 => CliError::Forbidden(err.message),
        404 => CliError::NotFound(err.message),
        _ => CliError::System(err.message),
    }
}

/// Writes events to the output, tracking in-place rows on terminals
struct Display {
    out: OutStream,
    terminal: bool,
    rows: HashMap<String, usize>,
}

impl Display {
    fn new(out: OutStream) -> Self {
        let terminal = out.is_terminal();
        Self {
            out,
            terminal,
            rows: HashMap::new(),
        }
    }

    fn show(&mut self, msg: &JsonMessage) -> std::io::Result<()> {
        if let Some(stream) = &msg.stream {
            if msg.failure().is_none() {
                self.out.write_all(stream.as_bytes())?;
                return self.out.flush();
            }
        }

        if !self.terminal || !msg.is_progress() {
            // Plain lines end the in-place section.
            self.rows.clear();
            writeln!(self.out, "{}", msg.render(self.terminal))?;
            return self.out.flush();
        }

        let id = msg.id.clone().unwrap_or_default();
        let line = match self.rows.get(&id) {
            Some(&line) => line,
            None => {
                let line = self.rows.len();
                self.rows.insert(id, line);
                writeln!(self.out)?;
                line
            }
        };
        let diff = (self.rows.len() - line) as u16;
        crossterm::queue!(self.out, MoveUp(diff), Clear(ClearType::CurrentLine))?;
        write!(self.out, "\r{}", msg.render(true))?;
        crossterm::queue!(self.out, MoveDown(diff))?;
        write!(self.out, "\r")?;
        self.out.flush()
    }
}

/// Render a progress stream until EOF or an error event.
///
/// `on_aux` receives the `aux` payload of events that carry one (the push
/// digest, build image ids). The first error event is printed and returned.
pub async fn display_stream<R>(
    reader: R,
    out: OutStream,
    mut on_aux: Option<&mut (dyn FnMut(&Value) + Send)>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<JsonMessage>(1);
    let display = tokio::spawn(async move {
        let mut display = Display::new(out);
        while let Some(msg) = rx.recv().await {
            display.show(&msg)?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(reader).lines();
    let mut failure = None;
    let read_result: Result<()> = async {
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let msg: JsonMessage = serde_json::from_str(line).map_err(|e| {
                CliError::system(format!("error decoding progress stream: {}", e))
            })?;
            if let Some(aux) = &msg.aux {
                if let Some(handler) = on_aux.as_mut() {
                    handler(aux);
                }
                continue;
            }
            failure = msg.failure();
            if tx.send(msg).await.is_err() {
                break;
            }
            if failure.is_some() {
                break;
            }
        }
        Ok(())
    }
    .await;
    drop(tx);

    match display.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.into()),
        Err(e) => return Err(CliError::system(format!("progress display failed: {}", e))),
    }
    read_result?;
    match failure {
        Some(err) => Err(to_error(err)),
        None => Ok(()),
    }
}
