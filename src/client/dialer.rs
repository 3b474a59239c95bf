//! Dialers for every daemon address scheme
//!
//! `unix://path`, `tcp://host:port` (optionally wrapped in TLS),
//! `ssh://[user@]host[:port]` tunnelled over `ssh ... docker system dial-stdio`,
//! and `fd://N` for an inherited socket. `npipe://` only exists on Windows.

use crate::{CliError, Result};
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

#[cfg(unix)]
use tokio::net::UnixStream;

/// Connect timeout for TCP daemons
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP keep-alive idle time
pub const KEEPALIVE: Duration = Duration::from_secs(30);

const DEFAULT_TCP_PORT: u16 = 2375;
const DEFAULT_TLS_PORT: u16 = 2376;

/// Parsed daemon address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonAddr {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
    Npipe(String),
    Ssh {
        user: Option<String>,
        host: String,
        port: Option<u16>,
    },
    Fd(i32),
}

impl DaemonAddr {
    /// Parse a host string; `tls` picks the default TCP port.
    pub fn parse(host: &str, tls: bool) -> Result<Self> {
        let host = host.trim();
        let invalid = |detail: &str| {
            CliError::invalid_argument(format!("invalid daemon address {:?}: {}", host, detail))
        };

        let (scheme, rest) = host.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        match scheme {
            "unix" => {
                if rest.is_empty() {
                    return Err(invalid("empty socket path"));
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            "npipe" => Ok(Self::Npipe(rest.to_string())),
            "fd" => rest
                .parse()
                .map(Self::Fd)
                .map_err(|_| invalid("fd must be a number")),
            "tcp" | "http" | "https" => {
                let url = url::Url::parse(&format!("tcp://{}", rest))
                    .map_err(|e| invalid(&e.to_string()))?;
                let hostname = url.host_str().ok_or_else(|| invalid("missing host"))?;
                if url.path() != "" && url.path() != "/" {
                    return Err(invalid("paths are not supported"));
                }
                let port = url.port().unwrap_or(if tls || scheme == "https" {
                    DEFAULT_TLS_PORT
                } else {
                    DEFAULT_TCP_PORT
                });
                Ok(Self::Tcp {
                    host: hostname.trim_matches(|c| c == '[' || c == ']').to_string(),
                    port,
                })
            }
            "ssh" => {
                let url = url::Url::parse(host).map_err(|e| invalid(&e.to_string()))?;
                let hostname = url.host_str().ok_or_else(|| invalid("missing host"))?;
                if url.password().is_some() {
                    return Err(invalid("plain-text password is not supported"));
                }
                if url.path() != "" && url.path() != "/" {
                    return Err(invalid("extra path after the host is not supported"));
                }
                Ok(Self::Ssh {
                    user: Some(url.username().to_string()).filter(|u| !u.is_empty()),
                    host: hostname.to_string(),
                    port: url.port(),
                })
            }
            other => Err(invalid(&format!("unsupported scheme {:?}", other))),
        }
    }

    /// Host name sent in the HTTP `Host` header and used for TLS SNI
    pub fn authority(&self) -> String {
        match self {
            Self::Tcp { host, port } => format!("{}:{}", host, port),
            _ => "api.moby.localhost".to_string(),
        }
    }
}

/// A connection to the daemon as produced by a dialer
pub enum Connection {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    Command(CommandConn),
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            #[cfg(unix)]
            Self::Unix(_) => "unix",
            Self::Tcp(_) => "tcp",
            Self::Tls(_) => "tls",
            Self::Command(_) => "command",
        };
        f.debug_tuple("Connection").field(&kind).finish()
    }
}

macro_rules! delegate {
    ($self:ident, $conn:ident => $body:expr) => {
        match $self.get_mut() {
            #[cfg(unix)]
            Connection::Unix($conn) => {
                let $conn = Pin::new($conn);
                $body
            }
            Connection::Tcp($conn) => {
                let $conn = Pin::new($conn);
                $body
            }
            Connection::Tls($conn) => {
                let $conn = Pin::new(&mut **$conn);
                $body
            }
            Connection::Command($conn) => {
                let $conn = Pin::new($conn);
                $body
            }
        }
    };
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        delegate!(self, conn => conn.poll_read(cx, buf))
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        delegate!(self, conn => conn.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self, conn => conn.poll_flush(cx))
    }

    /// Half-closes the write side; reads continue until the peer closes.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        delegate!(self, conn => conn.poll_shutdown(cx))
    }
}

/// Time a command connection gets to exit after SIGTERM before it is killed
const COMMAND_GRACE: Duration = Duration::from_secs(2);

/// A subprocess whose stdio carries the connection (`ssh` tunnels)
pub struct CommandConn {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
}

impl CommandConn {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        tracing::debug!("dialing through command: {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| CliError::system(format!("failed to start {}: {}", program, e)))?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CliError::system(format!("{} has no stdout", program)))?;
        Ok(Self {
            child: Some(child),
            stdin,
            stdout,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

impl Drop for CommandConn {
    /// SIGTERM first; the child is killed if it outlives [`COMMAND_GRACE`].
    fn drop(&mut self) {
        self.stdin.take();
        let Some(mut child) = self.child.take() else {
            return;
        };
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::debug!("SIGTERM to command connection {}: {}", pid, e);
            }
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if tokio::time::timeout(COMMAND_GRACE, child.wait()).await.is_err() {
                        let _ = child.kill().await;
                    }
                });
            }
            Err(_) => {
                let _ = child.start_kill();
            }
        }
    }
}

impl AsyncRead for CommandConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

impl AsyncWrite for CommandConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_write(cx, buf),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "command connection write side closed",
            ))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().stdin.as_mut() {
            Some(stdin) => Pin::new(stdin).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        // Dropping stdin delivers EOF to the child.
        self.get_mut().stdin.take();
        Poll::Ready(Ok(()))
    }
}

/// Opens connections to one daemon address
#[derive(Clone)]
pub struct Dialer {
    addr: DaemonAddr,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("addr", &self.addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl Dialer {
    pub fn new(addr: DaemonAddr, tls: Option<Arc<rustls::ClientConfig>>) -> Self {
        Self { addr, tls }
    }

    pub fn addr(&self) -> &DaemonAddr {
        &self.addr
    }

    /// TLS streams cannot half-close, which hijacked sessions need to know.
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some() && matches!(self.addr, DaemonAddr::Tcp { .. })
    }

    pub async fn dial(&self) -> Result<Connection> {
        match &self.addr {
            #[cfg(unix)]
            DaemonAddr::Unix(path) => UnixStream::connect(path)
                .await
                .map(Connection::Unix)
                .map_err(|e| {
                    CliError::system(format!(
                        "Cannot connect to the Docker daemon at unix://{}. Is the docker daemon running? ({})",
                        path.display(),
                        e
                    ))
                }),
            #[cfg(not(unix))]
            DaemonAddr::Unix(_) => Err(CliError::invalid_argument(
                "unix sockets are not supported on this platform",
            )),
            DaemonAddr::Npipe(_) => Err(CliError::invalid_argument(
                "npipe protocol is only supported on Windows",
            )),
            DaemonAddr::Tcp { host, port } => {
                let stream = tokio::time::timeout(
                    CONNECT_TIMEOUT,
                    TcpStream::connect((host.as_str(), *port)),
                )
                .await
                .map_err(|_| {
                    CliError::system(format!("timed out connecting to tcp://{}:{}", host, port))
                })?
                .map_err(|e| {
                    CliError::system(format!(
                        "Cannot connect to the Docker daemon at tcp://{}:{}. Is the docker daemon running? ({})",
                        host, port, e
                    ))
                })?;
                set_keepalive(&stream);
                let _ = stream.set_nodelay(true);

                match &self.tls {
                    None => Ok(Connection::Tcp(stream)),
                    Some(config) => {
                        let name = rustls::pki_types::ServerName::try_from(host.clone())
                            .map_err(|e| CliError::invalid_argument(format!("invalid server name {}: {}", host, e)))?;
                        let tls = TlsConnector::from(config.clone())
                            .connect(name, stream)
                            .await
                            .map_err(|e| CliError::system(format!("TLS handshake with {} failed: {}", host, e)))?;
                        Ok(Connection::Tls(Box::new(tls)))
                    }
                }
            }
            DaemonAddr::Ssh { user, host, port } => {
                let mut args = Vec::new();
                if let Some(user) = user {
                    args.push("-l".to_string());
                    args.push(user.clone());
                }
                if let Some(port) = port {
                    args.push("-p".to_string());
                    args.push(port.to_string());
                }
                args.extend([
                    "--".to_string(),
                    host.clone(),
                    crate::APP_NAME.to_string(),
                    "system".to_string(),
                    "dial-stdio".to_string(),
                ]);
                CommandConn::spawn("ssh", &args).map(Connection::Command)
            }
            #[cfg(unix)]
            DaemonAddr::Fd(fd) => {
                use std::os::unix::io::FromRawFd;
                // Each dial owns a duplicate; the inherited descriptor stays open.
                let dup = nix::unistd::dup(*fd).map_err(io::Error::from)?;
                let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(dup) };
                std_stream.set_nonblocking(true)?;
                Ok(Connection::Unix(UnixStream::from_std(std_stream)?))
            }
            #[cfg(not(unix))]
            DaemonAddr::Fd(_) => Err(CliError::invalid_argument(
                "fd protocol is not supported on this platform",
            )),
        }
    }
}

#[cfg(unix)]
fn set_keepalive(stream: &TcpStream) {
    use std::os::unix::io::AsRawFd;
    let fd = stream.as_raw_fd();
    let on: libc::c_int = 1;
    #[allow(unused_variables)]
    let idle = KEEPALIVE.as_secs() as libc::c_int;
    let size = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            &on as *const libc::c_int as *const libc::c_void,
            size,
        );
        #[cfg(any(target_os = "linux", target_os = "android"))]
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_KEEPIDLE,
            &idle as *const libc::c_int as *const libc::c_void,
            size,
        );
        #[cfg(target_os = "macos")]
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_KEEPALIVE,
            &idle as *const libc::c_int as *const libc::c_void,
            size,
        );
    }
}

#[cfg(not(unix))]
fn set_keepalive(_stream: &TcpStream) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_parse_schemes() {
        assert_eq!(
            DaemonAddr::parse("unix:///var/run/docker.sock", false).unwrap(),
            DaemonAddr::Unix(PathBuf::from("/var/run/docker.sock"))
        );
        assert_eq!(
            DaemonAddr::parse("tcp://h", false).unwrap(),
            DaemonAddr::Tcp {
                host: "h".into(),
                port: 2375
            }
        );
        assert_eq!(
            DaemonAddr::parse("tcp://h", true).unwrap(),
            DaemonAddr::Tcp {
                host: "h".into(),
                port: 2376
            }
        );
        assert_eq!(
            DaemonAddr::parse("ssh://me@box:2222", false).unwrap(),
            DaemonAddr::Ssh {
                user: Some("me".into()),
                host: "box".into(),
                port: Some(2222)
            }
        );
        assert_eq!(DaemonAddr::parse("fd://3", false).unwrap(), DaemonAddr::Fd(3));
    }

    #[test]
    fn test_parse_rejects_bad_addresses() {
        assert!(DaemonAddr::parse("localhost:2375", false).is_err());
        assert!(DaemonAddr::parse("ftp://h", false).is_err());
        assert!(DaemonAddr::parse("ssh://u:pw@h", false).is_err());
        assert!(DaemonAddr::parse("tcp://h:1/path", false).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_npipe_fails_on_unix() {
        let dialer = Dialer::new(DaemonAddr::Npipe("//./pipe/docker".into()), None);
        assert!(dialer.dial().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_conn_half_close() {
        let mut conn = CommandConn::spawn("cat", &[]).unwrap();
        conn.write_all(b"ping").await.unwrap();
        conn.shutdown().await.unwrap();
        let mut out = String::new();
        conn.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "ping");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_dial() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("d.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut s, _) = listener.accept().await.unwrap();
            s.write_all(b"hi").await.unwrap();
        });

        let dialer = Dialer::new(DaemonAddr::Unix(path), None);
        let mut conn = dialer.dial().await.unwrap();
        let mut buf = [0u8; 2];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }
}
