//! Demultiplexer for non-TTY attach and log streams
//!
//! Every frame starts with an 8-byte header `[stream, 0, 0, 0, len(4, BE)]`
//! followed by `len` payload bytes.

use crate::{CliError, Result};
use std::io::Write;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const STDIN: u8 = 0;
pub const STDOUT: u8 = 1;
pub const STDERR: u8 = 2;
/// Error text emitted by the daemon mid-stream
pub const SYSTEM_ERR: u8 = 3;

const HEADER_LEN: usize = 8;
const CHUNK_LEN: usize = 32 * 1024;
const MAX_ERROR_MESSAGE: usize = 64 * 1024;

/// Copy one frame payload of `len` bytes to `dst`, a chunk at a time.
async fn copy_frame<R, W>(frame: &mut R, chunk: &mut [u8], dst: &mut W, len: u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: Write + ?Sized,
{
    let mut remaining = len;
    while remaining > 0 {
        let n = frame.read(chunk).await?;
        if n == 0 {
            return Err(CliError::system(format!(
                "frame payload shorter than its declared {} bytes",
                len
            )));
        }
        dst.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }
    dst.flush()?;
    Ok(())
}

/// Encode one frame
pub fn encode_frame(stream: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&[stream, 0, 0, 0]);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split frames from `src` into `out` and `err` until EOF.
///
/// Returns the number of payload bytes written. EOF inside a frame is an
/// error, as is a system-error frame, whose payload becomes the message.
pub async fn demux<R, O, E>(mut src: R, out: &mut O, err: &mut E) -> Result<u64>
where
    R: AsyncRead + Unpin,
    O: Write + ?Sized,
    E: Write + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    let mut chunk = vec![0u8; CHUNK_LEN];
    let mut written = 0u64;

    loop {
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = src.read(&mut header[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(written);
                }
                return Err(CliError::system(format!(
                    "unexpected EOF in frame header after {} of {} bytes",
                    filled, HEADER_LEN
                )));
            }
            filled += n;
        }

        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as u64;
        let mut frame = (&mut src).take(len);
        match header[0] {
            STDIN | STDOUT => copy_frame(&mut frame, &mut chunk, out, len).await?,
            STDERR => copy_frame(&mut frame, &mut chunk, err, len).await?,
            SYSTEM_ERR => {
                let mut message = Vec::new();
                (&mut frame)
                    .take(MAX_ERROR_MESSAGE as u64)
                    .read_to_end(&mut message)
                    .await?;
                // Anything past the kept prefix is drained and dropped.
                tokio::io::copy(&mut frame, &mut tokio::io::sink()).await?;
                return Err(CliError::system(format!(
                    "error from daemon in stream: {}",
                    String::from_utf8_lossy(&message)
                )));
            }
            other => {
                return Err(CliError::system(format!(
                    "unrecognized input header: {}",
                    other
                )));
            }
        }
        written += len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_partitioned_by_stream() {
        let mut input = Vec::new();
        input.extend(encode_frame(STDOUT, b"out-1 "));
        input.extend(encode_frame(STDERR, b"err-1"));
        input.extend(encode_frame(STDOUT, b"out-2"));
        input.extend(encode_frame(STDOUT, b""));

        let (mut out, mut err) = (Vec::new(), Vec::new());
        let n = demux(input.as_slice(), &mut out, &mut err).await.unwrap();
        assert_eq!(out, b"out-1 out-2");
        assert_eq!(err, b"err-1");
        assert_eq!(n, 16);
    }

    #[tokio::test]
    async fn test_short_payload_is_fatal() {
        let mut input = encode_frame(STDOUT, b"hello");
        input.truncate(input.len() - 2);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert!(demux(input.as_slice(), &mut out, &mut err).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_length_is_not_preallocated() {
        let mut input = vec![STDOUT, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        input.extend_from_slice(b"partial");
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let e = demux(input.as_slice(), &mut out, &mut err).await.unwrap_err();
        assert!(e.to_string().contains("shorter than its declared"), "{}", e);
        assert_eq!(out, b"partial");
    }

    #[tokio::test]
    async fn test_truncated_header_is_fatal() {
        let input = [1u8, 0, 0];
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert!(demux(&input[..], &mut out, &mut err).await.is_err());
    }

    #[tokio::test]
    async fn test_system_error_frame() {
        let input = encode_frame(SYSTEM_ERR, b"container died");
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let e = demux(input.as_slice(), &mut out, &mut err).await.unwrap_err();
        assert!(e.to_string().contains("container died"));
    }

    #[tokio::test]
    async fn test_unknown_stream_id() {
        let input = encode_frame(9, b"x");
        let (mut out, mut err) = (Vec::new(), Vec::new());
        assert!(demux(input.as_slice(), &mut out, &mut err).await.is_err());
    }
}
