//! The stream triple handed to every command: stdin, stdout and stderr
//!
//! `In` is an async reader shared behind a lock so prompts and hijacked
//! sessions can borrow it in turn. `Out`/`Err` are cloneable synchronous
//! writers; rendering code writes to them directly.

pub mod term;

pub use term::{RawModeGuard, WindowSize};

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncRead;
use tokio::sync::OwnedMutexGuard;

#[cfg(unix)]
use std::os::unix::io::RawFd;
#[cfg(not(unix))]
type RawFd = i32;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Input side of the stream triple
#[derive(Clone)]
pub struct InStream {
    reader: Arc<tokio::sync::Mutex<BoxedReader>>,
    fd: Option<RawFd>,
    is_terminal: bool,
}

impl InStream {
    /// The process stdin
    pub fn stdin() -> Self {
        Self {
            reader: Arc::new(tokio::sync::Mutex::new(Box::new(tokio::io::stdin()))),
            fd: Some(0),
            is_terminal: io::stdin().is_terminal(),
        }
    }

    /// A non-terminal input fed from `reader`
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Arc::new(tokio::sync::Mutex::new(Box::new(reader))),
            fd: None,
            is_terminal: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Exclusive access to the reader until the guard is dropped.
    pub async fn lock(&self) -> OwnedMutexGuard<BoxedReader> {
        self.reader.clone().lock_owned().await
    }

    /// Put the terminal in raw mode; `None` when stdin is not a terminal.
    pub fn set_raw_terminal(&self) -> io::Result<Option<RawModeGuard>> {
        if !self.is_terminal {
            return Ok(None);
        }
        RawModeGuard::acquire().map(Some)
    }
}

/// Output side of the stream triple
#[derive(Clone)]
pub struct OutStream {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    fd: Option<RawFd>,
    is_terminal: bool,
}

impl OutStream {
    pub fn stdout() -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(io::stdout()))),
            fd: Some(1),
            is_terminal: io::stdout().is_terminal(),
        }
    }

    pub fn stderr() -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(io::stderr()))),
            fd: Some(2),
            is_terminal: io::stderr().is_terminal(),
        }
    }

    /// Wrap an arbitrary writer; `is_terminal` selects TTY rendering.
    pub fn from_writer(writer: impl Write + Send + 'static, is_terminal: bool) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            fd: None,
            is_terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.fd
    }

    /// Colour output is used on terminals unless `NO_COLOR` is set.
    pub fn supports_color(&self) -> bool {
        self.is_terminal && std::env::var_os("NO_COLOR").is_none()
    }

    /// Size of the terminal behind this stream, if it is one
    pub fn window_size(&self) -> Option<WindowSize> {
        if !self.is_terminal {
            return None;
        }
        WindowSize::current().ok()
    }
}

impl Write for OutStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .flush()
    }
}

/// In-memory writer whose contents can be read back, shared between clones
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// An [`OutStream`] writing into this buffer
    pub fn out_stream(&self, is_terminal: bool) -> OutStream {
        OutStream::from_writer(self.clone(), is_terminal)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// stdin, stdout and stderr of one invocation
#[derive(Clone)]
pub struct Streams {
    pub input: InStream,
    pub out: OutStream,
    pub err: OutStream,
}

impl Streams {
    pub fn standard() -> Self {
        Self {
            input: InStream::stdin(),
            out: OutStream::stdout(),
            err: OutStream::stderr(),
        }
    }

    /// Streams backed by memory; returns the stdout and stderr buffers.
    pub fn in_memory(
        input: impl AsyncRead + Send + Unpin + 'static,
    ) -> (Self, SharedBuffer, SharedBuffer) {
        let out = SharedBuffer::new();
        let err = SharedBuffer::new();
        let streams = Self {
            input: InStream::from_reader(input),
            out: out.out_stream(false),
            err: err.out_stream(false),
        };
        (streams, out, err)
    }
}
