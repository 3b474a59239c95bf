//! Terminal control: raw mode, echo, window size and resize monitoring

use std::io;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

impl WindowSize {
    /// Size of the controlling terminal
    pub fn current() -> io::Result<Self> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(Self { rows, cols })
    }
}

static RAW_DEPTH: Mutex<usize> = Mutex::new(0);

/// Reference-counted raw mode. The terminal leaves raw mode when the last
/// guard is dropped, so nested holders cooperate.
#[derive(Debug)]
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn acquire() -> io::Result<Self> {
        let mut depth = RAW_DEPTH.lock().unwrap_or_else(|p| p.into_inner());
        if *depth == 0 {
            crossterm::terminal::enable_raw_mode()?;
            tracing::debug!("terminal switched to raw mode");
        }
        *depth += 1;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut depth = RAW_DEPTH.lock().unwrap_or_else(|p| p.into_inner());
        *depth = depth.saturating_sub(1);
        if *depth == 0 {
            if let Err(e) = crossterm::terminal::disable_raw_mode() {
                tracing::debug!("failed to restore terminal mode: {}", e);
            }
        }
    }
}

/// Local echo disabled on a terminal fd until dropped
#[cfg(unix)]
pub struct EchoGuard {
    fd: std::os::unix::io::RawFd,
    saved: libc::termios,
}

#[cfg(unix)]
impl EchoGuard {
    pub fn disable(fd: std::os::unix::io::RawFd) -> io::Result<Self> {
        // SAFETY: termios is plain data and tcgetattr fully initialises it on success.
        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let mut quiet = saved;
        quiet.c_lflag &= !libc::ECHO;
        quiet.c_lflag |= libc::ECHONL;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &quiet) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self { fd, saved })
    }
}

#[cfg(unix)]
impl Drop for EchoGuard {
    fn drop(&mut self) {
        unsafe {
            libc::tcsetattr(self.fd, libc::TCSANOW, &self.saved);
        }
    }
}

/// Deliver window-size changes until `cancel` fires.
///
/// The current size is sent first so callers can size the remote TTY before
/// any resize happens.
#[cfg(unix)]
pub fn monitor_tty(cancel: CancellationToken) -> mpsc::Receiver<WindowSize> {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        if let Ok(size) = WindowSize::current() {
            if tx.send(size).await.is_err() {
                return;
            }
        }
        let mut sigwinch = match signal(SignalKind::window_change()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("failed to register SIGWINCH handler: {}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                got = sigwinch.recv() => {
                    if got.is_none() {
                        break;
                    }
                    if let Ok(size) = WindowSize::current() {
                        if tx.send(size).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_size_does_not_panic_without_tty() {
        let _ = WindowSize::current();
    }

    #[cfg(unix)]
    #[test]
    fn test_echo_guard_rejects_non_tty() {
        let file = tempfile::tempfile().unwrap();
        use std::os::unix::io::AsRawFd;
        assert!(EchoGuard::disable(file.as_raw_fd()).is_err());
    }
}
