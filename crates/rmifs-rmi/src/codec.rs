//! Frame codec
//!
//! Every message is `magic | version u16 BE | length u32 BE | bincode payload`.
//! One request and one response travel over each connection.

use crate::error::{Fault, Result, RmiError};
use crate::value::Value;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame magic
pub const MAGIC: [u8; 4] = *b"RMFS";

/// Current wire protocol version
pub const PROTOCOL_VERSION: u16 = 1;

/// Default frame payload limit (64 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

const HEADER_LEN: usize = 10;

/// A call as written by a stub
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Interface the caller believes the skeleton serves
    pub interface: String,
    pub method: String,
    /// Parameter type descriptors, one per argument
    pub param_types: Vec<String>,
    pub args: Vec<Value>,
}

/// Outcome written back by a skeleton
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallResponse {
    Success(Value),
    Failure(Fault),
}

impl CallResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Encode a message into a complete frame
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let payload = bincode::serialize(message)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| RmiError::protocol(format!("payload of {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a complete frame held in memory
pub fn decode<T: DeserializeOwned>(frame: &[u8], max_len: usize) -> Result<T> {
    if frame.len() < HEADER_LEN {
        return Err(RmiError::protocol("truncated frame header"));
    }
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(&frame[..HEADER_LEN]);
    let len = check_header(&header, max_len)?;

    let payload = &frame[HEADER_LEN..];
    if payload.len() != len {
        return Err(RmiError::protocol(format!(
            "frame declares {len} bytes, carries {}",
            payload.len()
        )));
    }
    Ok(bincode::deserialize(payload)?)
}

fn check_header(header: &[u8; HEADER_LEN], max_len: usize) -> Result<usize> {
    if header[..4] != MAGIC {
        return Err(RmiError::protocol("bad frame magic"));
    }
    let version = u16::from_be_bytes([header[4], header[5]]);
    if version != PROTOCOL_VERSION {
        return Err(RmiError::protocol(format!(
            "unsupported protocol version {version}"
        )));
    }
    let len = u32::from_be_bytes([header[6], header[7], header[8], header[9]]) as usize;
    if len > max_len {
        return Err(RmiError::protocol(format!(
            "frame of {len} bytes exceeds limit of {max_len}"
        )));
    }
    Ok(len)
}

/// Write one framed message and flush
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message
pub async fn read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await?;
    let len = check_header(&header, max_len)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}
