//! HTTP/3 frame and stream-type constants plus the varint frame header
//! codec (RFC 9114 Section 7).

use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::wire;

/// Unidirectional stream type of a control stream.
pub const STREAM_CONTROL: u64 = 0x00;

pub const FRAME_DATA: u64 = 0x00;
pub const FRAME_HEADERS: u64 = 0x01;
pub const FRAME_SETTINGS: u64 = 0x04;

/// A frame header: two varints, type then payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: u64,
    pub length: u64,
}

impl std::fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[frame type=0x{:x} length={}]", self.frame_type, self.length)
    }
}

impl FrameHeader {
    /// Serialize type and length for the wire.
    pub fn encode(frame_type: u64, length: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(wire::varint_size(frame_type) + wire::varint_size(length));
        wire::put_varint(frame_type, &mut buf);
        wire::put_varint(length, &mut buf);
        buf
    }
}

/// Read one frame header. `Ok(None)` means the stream finished cleanly
/// before any byte; EOF anywhere inside the header is malformed-wire.
pub async fn read_frame_header<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<FrameHeader>> {
    let frame_type = match wire::try_read_varint(r).await? {
        None => return Ok(None),
        Some(v) => v,
    };
    let length = wire::read_varint(r).await?;
    Ok(Some(FrameHeader { frame_type, length }))
}

/// One SETTINGS parameter: identifier/value varint pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u64,
    pub value: u64,
}

impl std::fmt::Display for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[setting id=0x{:x} value={}]", self.id, self.value)
    }
}

/// Parse a SETTINGS payload: varint pairs covering exactly the buffer.
pub fn parse_settings(mut payload: &[u8]) -> Result<Vec<Setting>> {
    let mut settings = Vec::new();
    while !payload.is_empty() {
        let (id, n) = wire::get_varint(payload)
            .ok_or_else(|| Error::wire("truncated SETTINGS parameter"))?;
        payload = &payload[n..];
        let (value, n) = wire::get_varint(payload)
            .ok_or_else(|| Error::wire("truncated SETTINGS parameter"))?;
        payload = &payload[n..];
        settings.push(Setting { id, value });
    }
    Ok(settings)
}
