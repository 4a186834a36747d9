//! Frame encoding and decoding for the control channel.
//!
//! Framing is `u32` length (little-endian) + ASCII payload
//! `">>instanceId|type|messageId|args<<"`. Decode errors are frame-local and
//! recoverable; I/O errors escalate.

use std::io::ErrorKind;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;

/// Upper bound on a single frame payload. A length beyond this almost
/// certainly means the stream has desynchronized, so it is treated as a
/// transport failure rather than a skippable frame.
const MAX_FRAME_LEN: u32 = 64 * 1024;

/// A frame-local parse failure. The decoder stays usable; the caller logs,
/// drops the frame, and reads the next one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty frame payload")]
    EmptyMessage,

    #[error("frame payload missing '>>' header")]
    MalformedHeader,

    #[error("frame payload missing '<<' footer")]
    MalformedFooter,

    #[error("expected 4 '|'-separated fields, found {0}")]
    WrongFieldCount(usize),
}

/// Errors surfaced by [`read_frame`]. `Decode` is frame-local; `Io` means the
/// channel itself failed and the session must tear down.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("channel read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True when the error affects only this frame and reading may continue.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, FrameError::Decode(_))
    }
}

/// Encode a message into a complete frame (length prefix + payload).
pub fn encode(message: &Message) -> Vec<u8> {
    let payload = format!(
        ">>{}|{}|{}|{}<<",
        message.instance_id, message.message_type, message.message_id, message.args
    );
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload.as_bytes());
    buf
}

/// Parse a frame payload (the bytes after the length prefix) into a message.
pub fn decode_payload(payload: &[u8]) -> Result<Message, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyMessage);
    }

    let body = payload
        .strip_prefix(b">>")
        .ok_or(DecodeError::MalformedHeader)?;
    let body = body
        .strip_suffix(b"<<")
        .ok_or(DecodeError::MalformedFooter)?;

    let fields: Vec<&[u8]> = body.split(|b| *b == b'|').collect();
    if fields.len() != 4 {
        return Err(DecodeError::WrongFieldCount(fields.len()));
    }

    Ok(Message {
        instance_id: String::from_utf8_lossy(fields[0]).into_owned(),
        message_type: String::from_utf8_lossy(fields[1]).into_owned(),
        message_id: String::from_utf8_lossy(fields[2]).into_owned(),
        args: String::from_utf8_lossy(fields[3]).into_owned(),
    })
}

/// Read one frame from the channel.
///
/// Returns `Ok(None)` on a clean close (EOF at a frame boundary). EOF in the
/// middle of a frame is a transport error.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf);
    if len == 0 {
        return Err(DecodeError::EmptyMessage.into());
    }
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("frame length {} exceeds {} bytes", len, MAX_FRAME_LEN),
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    Ok(Some(decode_payload(&payload)?))
}

/// Write one complete frame to the channel and flush.
pub async fn write_frame<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(message)).await?;
    writer.flush().await
}
