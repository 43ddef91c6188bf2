//! Length-prefixed bincode framing for packets on a byte stream
//!
//! Each frame is a big-endian `u32` payload length followed by the bincode
//! encoding of a [`Packet`]. Both the server and headless clients use these
//! helpers on top of any tokio `AsyncRead`/`AsyncWrite`.

use crate::Packet;
use bincode::{deserialize, serialize};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest payload accepted in a single frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed packet: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("Frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
}

/// Serializes a packet into a complete frame, length prefix included.
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, CodecError> {
    let payload = serialize(packet)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub fn decode_packet(payload: &[u8]) -> Result<Packet, CodecError> {
    Ok(deserialize(payload)?)
}

/// Reads the next packet from the stream.
///
/// Returns `Ok(None)` when the peer closed the stream on a frame boundary.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_packet(&payload).map(Some)
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
