//! Wire format for frames exchanged with the message server
//!
//! Each frame is sent as:
//! - 4 bytes: payload length (big-endian u32)
//! - N bytes: MessagePack-encoded WireFrame

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::{WireFrame, MAX_MESSAGE_SIZE};

/// Write a frame to an async writer (length-prefixed MessagePack)
pub async fn write_wire_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &WireFrame) -> Result<()> {
    let bytes = rmp_serde::to_vec(frame)?;

    if bytes.len() > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} > {}", bytes.len(), MAX_MESSAGE_SIZE);
    }

    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Read a frame from an async reader (length-prefixed MessagePack)
pub async fn read_wire_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<WireFrame> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_SIZE {
        anyhow::bail!("Message too large: {} > {}", len, MAX_MESSAGE_SIZE);
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    Ok(rmp_serde::from_slice(&buf)?)
}
