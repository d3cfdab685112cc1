//! Length-prefixed, checksummed frames
//!
//! Layout: `u32` payload length (big-endian), `u32` CRC-32 of the payload
//! (big-endian), then the bincode-encoded payload.

use crate::error::{DeedsError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload (512 MiB)
pub const MAX_FRAME_LEN: usize = 512 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(DeedsError::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    writer.write_u32(payload.len() as u32).await?;
    writer.write_u32(crc32fast::hash(&payload)).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `Ok(None)` on a clean end of stream
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_LEN {
        return Err(DeedsError::Protocol(format!(
            "peer announced frame of {} bytes, limit is {}",
            len, MAX_FRAME_LEN
        )));
    }

    let checksum = reader.read_u32().await?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    if crc32fast::hash(&payload) != checksum {
        return Err(DeedsError::Protocol("frame checksum mismatch".to_string()));
    }

    Ok(Some(bincode::deserialize(&payload)?))
}
