//! Bidirectional copy between the user's streams and a hijacked connection
//!
//! Used by `attach`, `run` and `exec`. One worker copies stdin to the
//! connection, the other copies the connection to stdout (or demultiplexes
//! it into stdout/stderr when no TTY was allocated).

pub mod escape;
pub mod stdcopy;

use crate::streams::{RawModeGuard, Streams};
use crate::{CliError, Result};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Anything usable as both halves of a connection
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> DuplexStream for T {}

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A connection taken over from an HTTP exchange, by capability
pub enum HijackedConn {
    /// The write side can be shut down while reads continue.
    HalfClosable(Box<dyn DuplexStream>),
    /// Shutting down the write side ends the whole session, so it is
    /// left open when stdin ends.
    FullDuplex(Box<dyn DuplexStream>),
    /// Separate read and write channels; `writer` is absent when the
    /// daemon streams output only.
    SimplexPair {
        reader: BoxedReader,
        writer: Option<BoxedWriter>,
    },
}

impl std::fmt::Debug for HijackedConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::HalfClosable(_) => "half-closable",
            Self::FullDuplex(_) => "full-duplex",
            Self::SimplexPair { .. } => "simplex-pair",
        };
        f.write_str(kind)
    }
}

impl HijackedConn {
    fn into_parts(self) -> (BoxedReader, Option<BoxedWriter>, bool) {
        match self {
            Self::HalfClosable(conn) => {
                let (r, w) = tokio::io::split(conn);
                (Box::new(r), Some(Box::new(w)), true)
            }
            Self::FullDuplex(conn) => {
                let (r, w) = tokio::io::split(conn);
                (Box::new(r), Some(Box::new(w)), false)
            }
            Self::SimplexPair { reader, writer } => (reader, writer, true),
        }
    }
}

/// What the session attaches and how
#[derive(Debug, Clone)]
pub struct HijackOptions {
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
    pub detach_keys: Vec<u8>,
}

impl Default for HijackOptions {
    fn default() -> Self {
        Self {
            attach_stdin: false,
            attach_stdout: true,
            attach_stderr: true,
            tty: false,
            detach_keys: vec![16, 17],
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HijackOutcome {
    /// The remote side closed the stream.
    Completed,
    /// The user typed the detach sequence.
    Detached,
}

enum InputEnd {
    Eof,
    Detached,
}

type SharedRestore = Arc<Mutex<Option<RawModeGuard>>>;

fn restore_terminal(restore: &SharedRestore) {
    restore.lock().unwrap_or_else(|p| p.into_inner()).take();
}

/// Run a hijacked session until output ends, the user detaches, a worker
/// fails, or `cancel` fires.
pub async fn hold_session(
    conn: HijackedConn,
    streams: &Streams,
    opts: &HijackOptions,
    cancel: &CancellationToken,
) -> Result<HijackOutcome> {
    let (reader, writer, half_close) = conn.into_parts();

    let guard = if opts.attach_stdin && opts.tty {
        streams.input.set_raw_terminal()?
    } else {
        None
    };
    let restore: SharedRestore = Arc::new(Mutex::new(guard));

    let output_attached = opts.attach_stdout || opts.attach_stderr;
    let input_attached = opts.attach_stdin && writer.is_some();

    let input = copy_input(streams, writer, half_close, opts);
    let output = copy_output(reader, streams, opts.tty, restore.clone());
    tokio::pin!(input, output);

    let mut input_done = !input_attached;
    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break Err(CliError::Cancelled("context canceled".to_string()));
            }
            result = &mut output => {
                tracing::debug!("[hijack] end of output stream");
                break result.map(|_| HijackOutcome::Completed);
            }
            result = &mut input, if !input_done => {
                match result {
                    Ok(InputEnd::Detached) => {
                        tracing::debug!("[hijack] detach sequence read");
                        break Ok(HijackOutcome::Detached);
                    }
                    Ok(InputEnd::Eof) => {
                        tracing::debug!("[hijack] end of stdin");
                        input_done = true;
                        if !output_attached {
                            break Ok(HijackOutcome::Completed);
                        }
                    }
                    Err(e) => break Err(e),
                }
            }
        }
    };

    restore_terminal(&restore);
    outcome
}

async fn copy_input(
    streams: &Streams,
    writer: Option<BoxedWriter>,
    half_close: bool,
    opts: &HijackOptions,
) -> Result<InputEnd> {
    let Some(mut writer) = writer else {
        return Ok(InputEnd::Eof);
    };
    let mut input = streams.input.lock().await;
    let source: &mut (dyn AsyncRead + Send + Unpin) = &mut **input;

    let copied = if opts.tty && !opts.detach_keys.is_empty() {
        let mut proxy = escape::EscapeProxy::new(source, opts.detach_keys.clone());
        tokio::io::copy(&mut proxy, &mut writer).await
    } else {
        tokio::io::copy(source, &mut writer).await
    };

    match copied {
        Ok(n) => {
            tracing::debug!("[hijack] copied {} bytes from stdin", n);
            if half_close {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("[hijack] couldn't half-close connection: {}", e);
                }
            }
            Ok(InputEnd::Eof)
        }
        Err(e) if escape::is_escape(&e) => Ok(InputEnd::Detached),
        Err(e) => Err(CliError::system(format!("error copying stdin: {}", e))),
    }
}

async fn copy_output(
    mut reader: BoxedReader,
    streams: &Streams,
    tty: bool,
    restore: SharedRestore,
) -> Result<()> {
    let mut out = streams.out.clone();
    let result = if tty {
        let mut buf = [0u8; 32 * 1024];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(CliError::from(e)),
            };
            if let Err(e) = out.write_all(&buf[..n]).and_then(|_| out.flush()) {
                break Err(e.into());
            }
        }
    } else {
        let mut err = streams.err.clone();
        stdcopy::demux(&mut reader, &mut out, &mut err)
            .await
            .map(|_| ())
    };
    // Subsequent prints must not inherit raw mode.
    restore_terminal(&restore);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_demultiplexed_output() {
        let (client, mut daemon) = tokio::io::duplex(1024);
        let (streams, out, err) = Streams::in_memory(&b""[..]);

        tokio::spawn(async move {
            daemon.write_all(&stdcopy::encode_frame(1, b"hello ")).await.unwrap();
            daemon.write_all(&stdcopy::encode_frame(2, b"oops")).await.unwrap();
            daemon.write_all(&stdcopy::encode_frame(1, b"world")).await.unwrap();
        });

        let outcome = hold_session(
            HijackedConn::HalfClosable(Box::new(client)),
            &streams,
            &HijackOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, HijackOutcome::Completed);
        assert_eq!(out.contents_string(), "hello world");
        assert_eq!(err.contents_string(), "oops");
    }

    #[tokio::test]
    async fn test_detach_is_distinguishable() {
        let (client, mut daemon) = tokio::io::duplex(1024);
        let (streams, _, _) = Streams::in_memory(&b"ls\n\x10\x11exit\n"[..]);
        let opts = HijackOptions {
            attach_stdin: true,
            tty: true,
            ..Default::default()
        };

        let outcome = hold_session(
            HijackedConn::HalfClosable(Box::new(client)),
            &streams,
            &opts,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, HijackOutcome::Detached);

        let mut received = vec![0u8; 3];
        daemon.read_exact(&mut received).await.unwrap();
        assert_eq!(received, b"ls\n");
    }

    #[tokio::test]
    async fn test_stdin_eof_half_closes_then_drains_output() {
        let (client, daemon) = tokio::io::duplex(1024);
        let (streams, out, _) = Streams::in_memory(&b"input"[..]);
        let opts = HijackOptions {
            attach_stdin: true,
            tty: true,
            ..Default::default()
        };

        tokio::spawn(async move {
            let (mut rd, mut wr) = tokio::io::split(daemon);
            let mut got = Vec::new();
            rd.read_to_end(&mut got).await.unwrap();
            wr.write_all(b"echo:").await.unwrap();
            wr.write_all(&got).await.unwrap();
        });

        let outcome = hold_session(
            HijackedConn::HalfClosable(Box::new(client)),
            &streams,
            &opts,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, HijackOutcome::Completed);
        assert_eq!(out.contents_string(), "echo:input");
    }

    #[tokio::test]
    async fn test_cancel_ends_session() {
        let (client, _daemon) = tokio::io::duplex(1024);
        let (streams, _, _) = Streams::in_memory(&b""[..]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = hold_session(
            HijackedConn::HalfClosable(Box::new(client)),
            &streams,
            &HijackOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn test_simplex_pair_without_writer() {
        let body = stdcopy::encode_frame(1, b"logs");
        let (streams, out, _) = Streams::in_memory(&b""[..]);
        let conn = HijackedConn::SimplexPair {
            reader: Box::new(std::io::Cursor::new(body)),
            writer: None,
        };
        let opts = HijackOptions {
            attach_stdin: true,
            ..Default::default()
        };
        let outcome = hold_session(conn, &streams, &opts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, HijackOutcome::Completed);
        assert_eq!(out.contents_string(), "logs");
    }
}
