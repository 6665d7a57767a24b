//! HTTP/2 frame types and binary serialization (RFC 9113 Section 4).

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header size (9 bytes per RFC 9113).
pub const FRAME_HEADER_SIZE: usize = 9;

/// The frame size both peers start from and that our SETTINGS pin.
pub const MAX_FRAME_SIZE: u32 = 16384;

/// HTTP/2 connection preface (client sends this first).
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Frame type identifiers per RFC 9113.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        match ft {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

/// Frame flags.
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1; // Same bit, SETTINGS/PING context
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// SETTINGS parameter identifiers.
pub mod settings {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// One SETTINGS parameter as it appeared on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: u16,
    pub value: u32,
}

impl Setting {
    /// Human name for the identifier, for diagnostics.
    pub fn name(&self) -> &'static str {
        match self.id {
            settings::HEADER_TABLE_SIZE => "HEADER_TABLE_SIZE",
            settings::ENABLE_PUSH => "ENABLE_PUSH",
            settings::MAX_CONCURRENT_STREAMS => "MAX_CONCURRENT_STREAMS",
            settings::INITIAL_WINDOW_SIZE => "INITIAL_WINDOW_SIZE",
            settings::MAX_FRAME_SIZE => "MAX_FRAME_SIZE",
            settings::MAX_HEADER_LIST_SIZE => "MAX_HEADER_LIST_SIZE",
            _ => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Setting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name(), self.value)
    }
}

/// Error codes per RFC 9113 Section 7, kept raw with a name lookup for
/// diagnostics.
pub fn error_code_name(code: u32) -> &'static str {
    match code {
        0x0 => "NO_ERROR",
        0x1 => "PROTOCOL_ERROR",
        0x2 => "INTERNAL_ERROR",
        0x3 => "FLOW_CONTROL_ERROR",
        0x4 => "SETTINGS_TIMEOUT",
        0x5 => "STREAM_CLOSED",
        0x6 => "FRAME_SIZE_ERROR",
        0x7 => "REFUSED_STREAM",
        0x8 => "CANCEL",
        0x9 => "COMPRESSION_ERROR",
        0xa => "CONNECT_ERROR",
        0xb => "ENHANCE_YOUR_CALM",
        0xc => "INADEQUATE_SECURITY",
        0xd => "HTTP_1_1_REQUIRED",
        _ => "UNKNOWN",
    }
}

/// Parsed 9-byte frame header.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    /// Parse from exactly [`FRAME_HEADER_SIZE`] bytes. The 31-bit stream
    /// identifier's reserved high bit is masked off on read.
    pub fn parse(buf: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32;
        let frame_type = FrameType::from(buf[3]);
        let flags = buf[4];
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        Self {
            length,
            frame_type,
            flags,
            stream_id,
        }
    }

    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type.into());
        buf.put_u8(self.flags);
        buf.put_u32(self.stream_id & 0x7fff_ffff);
    }
}

/// SETTINGS frame payload: identifier/value pairs in wire order.
#[derive(Debug, Clone, Default)]
pub struct SettingsFrame {
    pub settings: Vec<Setting>,
    pub ack: bool,
}

impl SettingsFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ack() -> Self {
        Self {
            settings: Vec::new(),
            ack: true,
        }
    }

    /// Add a parameter. Call order is wire order.
    pub fn set(&mut self, id: u16, value: u32) -> &mut Self {
        self.settings.push(Setting { id, value });
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let payload_len = if self.ack { 0 } else { self.settings.len() * 6 };
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);
        FrameHeader {
            length: payload_len as u32,
            frame_type: FrameType::Settings,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        }
        .serialize(&mut buf);
        for s in &self.settings {
            buf.put_u16(s.id);
            buf.put_u32(s.value);
        }
        buf
    }

    pub fn parse(flags: u8, mut payload: Bytes) -> Self {
        let ack = flags & flags::ACK != 0;
        let mut settings = Vec::new();
        while payload.remaining() >= 6 {
            let id = payload.get_u16();
            let value = payload.get_u32();
            settings.push(Setting { id, value });
        }
        Self { settings, ack }
    }
}

/// WINDOW_UPDATE frame.
#[derive(Debug, Clone, Copy)]
pub struct WindowUpdateFrame {
    pub stream_id: u32,
    pub increment: u32,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: u32, increment: u32) -> Self {
        Self {
            stream_id,
            increment,
        }
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 4);
        FrameHeader {
            length: 4,
            frame_type: FrameType::WindowUpdate,
            flags: 0,
            stream_id: self.stream_id,
        }
        .serialize(&mut buf);
        buf.put_u32(self.increment & 0x7fff_ffff);
        buf
    }

    pub fn parse(stream_id: u32, mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 4 {
            return None;
        }
        let increment = payload.get_u32() & 0x7fff_ffff;
        Some(Self {
            stream_id,
            increment,
        })
    }
}

/// HEADERS frame. Serialization never pads or carries priority; parsing
/// strips both.
#[derive(Debug, Clone)]
pub struct HeadersFrame {
    pub stream_id: u32,
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
}

impl HeadersFrame {
    pub fn new(stream_id: u32, header_block: Bytes) -> Self {
        Self {
            stream_id,
            header_block,
            end_stream: false,
            end_headers: true,
        }
    }

    pub fn end_stream(mut self, end: bool) -> Self {
        self.end_stream = end;
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.header_block.len());
        let mut frame_flags = 0u8;
        if self.end_stream {
            frame_flags |= flags::END_STREAM;
        }
        if self.end_headers {
            frame_flags |= flags::END_HEADERS;
        }
        FrameHeader {
            length: self.header_block.len() as u32,
            frame_type: FrameType::Headers,
            flags: frame_flags,
            stream_id: self.stream_id,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&self.header_block);
        buf
    }

    pub fn parse(stream_id: u32, flags_bits: u8, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("HEADERS frame on stream 0".into());
        }
        let end_stream = flags_bits & flags::END_STREAM != 0;
        let end_headers = flags_bits & flags::END_HEADERS != 0;

        let pad_len = if flags_bits & flags::PADDED != 0 {
            if payload.remaining() < 1 {
                return Err("padded HEADERS frame missing pad length".into());
            }
            payload.get_u8() as usize
        } else {
            0
        };
        if flags_bits & flags::PRIORITY != 0 {
            if payload.remaining() < 5 {
                return Err("HEADERS frame missing priority fields".into());
            }
            payload.advance(5);
        }
        if pad_len > payload.remaining() {
            return Err("HEADERS padding exceeds payload".into());
        }
        let header_block = payload.copy_to_bytes(payload.remaining() - pad_len);

        Ok(Self {
            stream_id,
            header_block,
            end_stream,
            end_headers,
        })
    }
}

/// CONTINUATION frame (RFC 9113 Section 6.10). Receive-only here: our
/// own header blocks fit one frame.
#[derive(Debug, Clone)]
pub struct ContinuationFrame {
    pub stream_id: u32,
    pub header_fragment: Bytes,
    pub end_headers: bool,
}

impl ContinuationFrame {
    pub fn parse(stream_id: u32, flags_bits: u8, payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("CONTINUATION frame on stream 0".into());
        }
        Ok(Self {
            stream_id,
            header_fragment: payload,
            end_headers: flags_bits & flags::END_HEADERS != 0,
        })
    }
}

/// DATA frame. Serialization never pads; parsing strips padding.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub end_stream: bool,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: Bytes) -> Self {
        Self {
            stream_id,
            data,
            end_stream: false,
        }
    }

    pub fn end_stream(mut self, end: bool) -> Self {
        self.end_stream = end;
        self
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.data.len());
        FrameHeader {
            length: self.data.len() as u32,
            frame_type: FrameType::Data,
            flags: if self.end_stream { flags::END_STREAM } else { 0 },
            stream_id: self.stream_id,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn parse(stream_id: u32, flags_bits: u8, mut payload: Bytes) -> Result<Self, String> {
        if stream_id == 0 {
            return Err("DATA frame on stream 0".into());
        }
        let end_stream = flags_bits & flags::END_STREAM != 0;
        let data = if flags_bits & flags::PADDED != 0 {
            if payload.remaining() < 1 {
                return Err("padded DATA frame missing pad length".into());
            }
            let pad_len = payload.get_u8() as usize;
            if pad_len > payload.remaining() {
                return Err("DATA padding exceeds payload".into());
            }
            payload.copy_to_bytes(payload.remaining() - pad_len)
        } else {
            payload
        };
        Ok(Self {
            stream_id,
            data,
            end_stream,
        })
    }
}

/// PING frame.
#[derive(Debug, Clone, Copy)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn ack(data: [u8; 8]) -> Self {
        Self { ack: true, data }
    }

    pub fn serialize(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + 8);
        FrameHeader {
            length: 8,
            frame_type: FrameType::Ping,
            flags: if self.ack { flags::ACK } else { 0 },
            stream_id: 0,
        }
        .serialize(&mut buf);
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn parse(flags_bits: u8, payload: &[u8]) -> Option<Self> {
        let data: [u8; 8] = payload.try_into().ok()?;
        Some(Self {
            ack: flags_bits & flags::ACK != 0,
            data,
        })
    }
}

/// GOAWAY frame. Receive-only.
#[derive(Debug, Clone)]
pub struct GoAwayFrame {
    pub last_stream_id: u32,
    pub error_code: u32,
    pub debug_data: Bytes,
}

impl GoAwayFrame {
    pub fn parse(mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 8 {
            return None;
        }
        let last_stream_id = payload.get_u32() & 0x7fff_ffff;
        let error_code = payload.get_u32();
        let debug_data = payload.copy_to_bytes(payload.remaining());
        Some(Self {
            last_stream_id,
            error_code,
            debug_data,
        })
    }
}

/// RST_STREAM frame. Receive-only.
#[derive(Debug, Clone, Copy)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    pub error_code: u32,
}

impl RstStreamFrame {
    pub fn parse(stream_id: u32, mut payload: Bytes) -> Option<Self> {
        if payload.remaining() < 4 {
            return None;
        }
        Some(Self {
            stream_id,
            error_code: payload.get_u32(),
        })
    }
}
