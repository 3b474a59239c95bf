//! Detach keys and the escape proxy that watches stdin for them

use crate::{CliError, Result};
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Sequence used when none is configured
pub const DEFAULT_DETACH_KEYS: &str = "ctrl-p,ctrl-q";

/// Marker error returned by [`EscapeProxy`] once the full sequence was read
#[derive(Debug, thiserror::Error)]
#[error("read escape sequence")]
pub struct EscapeError;

/// Whether an I/O error carries [`EscapeError`]
pub fn is_escape(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<EscapeError>())
}

/// Translate `ctrl-p,ctrl-q` style specs into bytes.
pub fn parse_detach_keys(spec: &str) -> Result<Vec<u8>> {
    let mut codes = Vec::new();
    for key in spec.split(',') {
        let lower = key.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("ctrl-").filter(|r| r.len() == 1) {
            let c = rest.as_bytes()[0];
            let code = match c {
                b'a'..=b'z' => c - b'a' + 1,
                b'@' => 0,
                b'[' => 27,
                b'\\' => 28,
                b']' => 29,
                b'^' => 30,
                b'_' => 31,
                _ => {
                    return Err(CliError::invalid_argument(format!(
                        "Unknown character: '{}'",
                        rest
                    )))
                }
            };
            codes.push(code);
        } else if key.len() == 1 {
            codes.push(key.as_bytes()[0]);
        } else {
            return Err(CliError::invalid_argument(format!(
                "Unknown character: '{}'",
                key
            )));
        }
    }
    Ok(codes)
}

/// Detach keys from the flag, then config; invalid specs fall back to the
/// default with a warning.
pub fn resolve_detach_keys(flag: Option<&str>, config: Option<&str>) -> Vec<u8> {
    let spec = flag
        .filter(|s| !s.is_empty())
        .or(config.filter(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_DETACH_KEYS);
    match parse_detach_keys(spec) {
        Ok(keys) => keys,
        Err(e) => {
            tracing::warn!("invalid detach keys {:?} ({}), using {}", spec, e, DEFAULT_DETACH_KEYS);
            vec![16, 17]
        }
    }
}

/// Reader that forwards bytes until the detach sequence appears.
///
/// Bytes that might start the sequence are held back; they are released if
/// the sequence breaks off. Once the whole sequence is read, every further
/// read fails with [`EscapeError`].
pub struct EscapeProxy<R> {
    inner: R,
    keys: Vec<u8>,
    matched: usize,
    pending: VecDeque<u8>,
    escaped: bool,
}

impl<R> EscapeProxy<R> {
    pub fn new(inner: R, keys: Vec<u8>) -> Self {
        Self {
            inner,
            keys,
            matched: 0,
            pending: VecDeque::new(),
            escaped: false,
        }
    }

    fn feed(&mut self, data: &[u8]) {
        for &b in data {
            if self.keys.is_empty() {
                self.pending.push_back(b);
                continue;
            }
            // Keep the longest suffix of the held bytes that still starts
            // the sequence and release the rest.
            let mut window = self.keys[..self.matched].to_vec();
            window.push(b);
            let keep = (1..=window.len().min(self.keys.len()))
                .rev()
                .find(|&k| window[window.len() - k..] == self.keys[..k])
                .unwrap_or(0);
            self.pending.extend(&window[..window.len() - keep]);
            self.matched = keep;
            if self.matched == self.keys.len() {
                self.escaped = true;
                return;
            }
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for EscapeProxy<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.pending.is_empty() {
                let n = this.pending.len().min(buf.remaining());
                let chunk: Vec<u8> = this.pending.drain(..n).collect();
                buf.put_slice(&chunk);
                return Poll::Ready(Ok(()));
            }
            if this.escaped {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, EscapeError)));
            }

            let mut tmp = [0u8; 1024];
            let mut read = ReadBuf::new(&mut tmp);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut read))?;
            let data = read.filled();
            if data.is_empty() {
                if this.matched > 0 {
                    let held = this.matched;
                    this.pending.extend(&this.keys[..held]);
                    this.matched = 0;
                    continue;
                }
                return Poll::Ready(Ok(()));
            }
            let data = data.to_vec();
            this.feed(&data);
        }
    }
}
