//
// framing.rs
//
// Content-Length framed JSON codec for the LSP byte stream
//

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors surfaced by the framing layer.
///
/// `EndOfStream` is the clean shutdown signal: the peer closed the stream at
/// a frame boundary. Everything else means the current frame is unusable;
/// the reader logs it and resynchronizes at the next header line.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The stream ended before the first header byte of a frame.
    #[error("end of stream")]
    EndOfStream,

    /// Headers without a usable `Content-Length`, or garbage where headers
    /// were expected.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The payload was not valid JSON (or a response failed to serialize).
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one framed message: HTTP-style headers terminated by a blank
/// `\r\n`, then exactly `Content-Length` bytes of UTF-8 JSON.
///
/// Only `Content-Length` is honored; other headers are ignored.
pub async fn read_message<R>(reader: &mut R) -> Result<serde_json::Value, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if saw_header {
                return Err(FrameError::MalformedFrame(
                    "stream ended inside frame headers".to_string(),
                ));
            }
            return Err(FrameError::EndOfStream);
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        saw_header = true;

        if let Some(value) = line.strip_prefix("Content-Length:") {
            let parsed = value.trim().parse::<usize>().map_err(|_| {
                FrameError::MalformedFrame(format!("unparseable Content-Length: {value:?}"))
            })?;
            content_length = Some(parsed);
        }
    }

    let length = content_length
        .ok_or_else(|| FrameError::MalformedFrame("missing Content-Length header".to_string()))?;

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    Ok(serde_json::from_slice(&payload)?)
}

/// Write one framed message.
///
/// Callers serialize writes per message (the backend holds a writer lock);
/// this function emits the header and payload as one uninterrupted sequence
/// and flushes before returning.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", payload.len());

    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
