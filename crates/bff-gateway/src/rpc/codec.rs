//! Length-prefixed frame codec.
//!
//! ```text
//! ┌────────────┬─────────────┬───────────┬────────────┬──────────────────┐
//! │ magic: u32 │ version: u16│ flags: u16│ length: u32│ bincode(RpcFrame)│
//! └────────────┴─────────────┴───────────┴────────────┴──────────────────┘
//!   12-byte big-endian header                          `length` bytes
//! ```
//!
//! The header is validated before the declared length is trusted, and the
//! length is checked against the frame limit before any allocation.

use crate::rpc::protocol::RpcFrame;
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frame magic ("BFF1").
pub const MAGIC: u32 = 0x4246_4631;

/// Wire format version.
pub const VERSION: u16 = 1;

/// Codec errors. All of them end the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid frame magic {0:#010x}")]
    InvalidMagic(u32),

    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u16),

    #[error("malformed frame body: {0}")]
    Decode(String),

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Fixed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    pub length: u32,
}

impl FrameHeader {
    /// Encoded header size.
    pub const LEN: usize = 12;

    /// Header for a body of `length` bytes.
    #[must_use]
    pub fn new(length: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            length,
        }
    }

    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.put_u32(self.magic);
        buf.put_u16(self.version);
        buf.put_u16(self.flags);
        buf.put_u32(self.length);
    }

    /// Decode and validate magic and version.
    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < Self::LEN {
            return Err(CodecError::Decode(format!(
                "incomplete header: {} bytes",
                buf.len()
            )));
        }
        let magic = buf.get_u32();
        if magic != MAGIC {
            return Err(CodecError::InvalidMagic(magic));
        }
        let version = buf.get_u16();
        if version != VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let flags = buf.get_u16();
        let length = buf.get_u32();
        Ok(Self {
            magic,
            version,
            flags,
            length,
        })
    }
}

/// Encode a frame with its header.
pub fn encode_frame(frame: &RpcFrame, max_frame_size: usize) -> Result<BytesMut, CodecError> {
    let body = bincode::serialize(frame).map_err(|e| CodecError::Encode(e.to_string()))?;
    if body.len() > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            size: body.len(),
            max: max_frame_size,
        });
    }
    let length = u32::try_from(body.len()).map_err(|_| CodecError::FrameTooLarge {
        size: body.len(),
        max: max_frame_size,
    })?;

    let mut buf = BytesMut::with_capacity(FrameHeader::LEN + body.len());
    FrameHeader::new(length).encode_into(&mut buf);
    buf.put_slice(&body);
    Ok(buf)
}

/// Decode a frame body.
pub fn decode_body(body: &[u8]) -> Result<RpcFrame, CodecError> {
    bincode::deserialize(body).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Read one frame. `Ok(None)` on a clean end of stream before a header.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<RpcFrame>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; FrameHeader::LEN];
    match reader.read_exact(&mut header_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let header = FrameHeader::decode(&header_bytes)?;
    let length = header.length as usize;
    if length > max_frame_size {
        return Err(CodecError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    decode_body(&body).map(Some)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &RpcFrame, max_frame_size: usize) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let buf = encode_frame(frame, max_frame_size)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
