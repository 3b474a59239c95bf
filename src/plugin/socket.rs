//! Control socket between the CLI and a running plugin
//!
//! Messages are JSON objects, each preceded by its length as a 4-byte
//! big-endian integer. The parent sends `{"type":"cancel"}` when it is
//! signalled; a plugin may report `{"type":"exit","code":N}` before exiting.

use crate::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

const MAX_MESSAGE: u32 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    Exit { code: i32 },
    Cancel,
}

pub async fn write_message<W: AsyncWrite + Unpin>(w: &mut W, msg: &ControlMessage) -> Result<()> {
    let body = serde_json::to_vec(msg)?;
    w.write_all(&(body.len() as u32).to_be_bytes()).await?;
    w.write_all(&body).await?;
    w.flush().await?;
    Ok(())
}

/// Next message, or `None` at a clean end of stream
pub async fn read_message<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<ControlMessage>> {
    let mut len = [0u8; 4];
    match r.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len);
    if len > MAX_MESSAGE {
        return Err(CliError::system(format!(
            "plugin control message too large: {} bytes",
            len
        )));
    }
    let mut body = vec![0u8; len as usize];
    r.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Parent side: listens for plugin connections.
pub struct ControlServer {
    path: PathBuf,
    conns: Arc<tokio::sync::Mutex<Vec<OwnedWriteHalf>>>,
    exit_code: Arc<Mutex<Option<i32>>>,
    accept: JoinHandle<()>,
}

impl ControlServer {
    /// Bind a fresh socket in the temporary directory.
    pub fn bind() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("docker_cli_{}.sock", uuid::Uuid::new_v4().simple()));
        Self::bind_at(path)
    }

    pub fn bind_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let listener = UnixListener::bind(&path)?;
        let conns = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let exit_code = Arc::new(Mutex::new(None));

        let accept = tokio::spawn({
            let conns = conns.clone();
            let exit_code = exit_code.clone();
            async move {
                loop {
                    let stream = match listener.accept().await {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            tracing::debug!("plugin control socket accept failed: {}", e);
                            break;
                        }
                    };
                    let (reader, writer) = stream.into_split();
                    conns.lock().await.push(writer);
                    tokio::spawn(watch_plugin(reader, exit_code.clone()));
                }
            }
        });

        Ok(Self {
            path,
            conns,
            exit_code,
            accept,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ask every connected plugin to shut down.
    pub async fn cancel(&self) {
        let mut conns = self.conns.lock().await;
        for conn in conns.iter_mut() {
            if let Err(e) = write_message(conn, &ControlMessage::Cancel).await {
                tracing::debug!("failed to notify plugin: {}", e);
            }
        }
    }

    /// Exit code reported by the plugin, if any
    pub fn reported_exit(&self) -> Option<i32> {
        *self.exit_code.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.accept.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn watch_plugin(mut reader: OwnedReadHalf, exit_code: Arc<Mutex<Option<i32>>>) {
    loop {
        match read_message(&mut reader).await {
            Ok(Some(ControlMessage::Exit { code })) => {
                *exit_code.lock().unwrap_or_else(|p| p.into_inner()) = Some(code);
            }
            Ok(Some(ControlMessage::Cancel)) => {
                tracing::debug!("ignoring cancel sent by plugin");
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("plugin control connection: {}", e);
                break;
            }
        }
    }
}

/// Plugin side of the control socket
pub struct ControlClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let (reader, writer) = UnixStream::connect(path).await?.into_split();
        Ok(Self { reader, writer })
    }

    /// Connect to the socket named by the environment, when run as a plugin.
    pub async fn connect_from_env() -> Result<Option<Self>> {
        match std::env::var_os(super::SOCKET_ENV).filter(|v| !v.is_empty()) {
            Some(path) => Ok(Some(Self::connect(PathBuf::from(path)).await?)),
            None => Ok(None),
        }
    }

    /// Resolve once the parent asks for shutdown or goes away.
    pub async fn cancelled(&mut self) -> Result<()> {
        loop {
            match read_message(&mut self.reader).await? {
                Some(ControlMessage::Cancel) | None => return Ok(()),
                Some(other) => tracing::debug!("unexpected control message {:?}", other),
            }
        }
    }

    pub async fn send_exit(&mut self, code: i32) -> Result<()> {
        write_message(&mut self.writer, &ControlMessage::Exit { code }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_wire_format() {
        assert_eq!(
            serde_json::to_string(&ControlMessage::Exit { code: 3 }).unwrap(),
            r#"{"type":"exit","code":3}"#
        );
        assert_eq!(
            serde_json::to_string(&ControlMessage::Cancel).unwrap(),
            r#"{"type":"cancel"}"#
        );
    }

    #[tokio::test]
    async fn test_length_prefixed_frames() {
        let mut buf = Vec::new();
        write_message(&mut buf, &ControlMessage::Cancel).await.unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 17]);

        let mut reader = &buf[..];
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Some(ControlMessage::Cancel)
        );
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let frame = (MAX_MESSAGE + 1).to_be_bytes();
        let mut reader = &frame[..];
        assert!(read_message(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_and_exit_round_trip() {
        let dir = TempDir::new().unwrap();
        let server = ControlServer::bind_at(dir.path().join("ctl.sock")).unwrap();
        let mut client = ControlClient::connect(server.path()).await.unwrap();
        client.send_exit(5).await.unwrap();

        // Wait for the server to register the connection.
        for _ in 0..100 {
            if server.reported_exit().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(server.reported_exit(), Some(5));

        server.cancel().await;
        tokio::time::timeout(Duration::from_secs(5), client.cancelled())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_socket_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ctl.sock");
        let server = ControlServer::bind_at(&path).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }
}
