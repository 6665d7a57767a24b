//! Frame-level scripting helpers for driving the HTTP/2 transport from
//! a test peer.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub const TYPE_DATA: u8 = 0x0;
pub const TYPE_HEADERS: u8 = 0x1;
pub const TYPE_SETTINGS: u8 = 0x4;
pub const TYPE_PING: u8 = 0x6;
pub const TYPE_GOAWAY: u8 = 0x7;
pub const TYPE_WINDOW_UPDATE: u8 = 0x8;

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;

/// A raw frame as read off the wire by the test peer.
#[derive(Debug)]
pub struct RawFrame {
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Vec<u8>,
}

pub async fn read_preface<S: AsyncRead + Unpin>(s: &mut S) {
    let mut preface = [0u8; 24];
    s.read_exact(&mut preface).await.unwrap();
    assert_eq!(&preface, PREFACE, "client preface mismatch");
}

pub async fn read_frame<S: AsyncRead + Unpin>(s: &mut S) -> RawFrame {
    let mut head = [0u8; 9];
    s.read_exact(&mut head).await.unwrap();
    let length = ((head[0] as usize) << 16) | ((head[1] as usize) << 8) | head[2] as usize;
    let frame_type = head[3];
    let flags = head[4];
    let stream_id = u32::from_be_bytes([head[5], head[6], head[7], head[8]]) & 0x7fff_ffff;
    let mut payload = vec![0u8; length];
    s.read_exact(&mut payload).await.unwrap();
    RawFrame {
        frame_type,
        flags,
        stream_id,
        payload,
    }
}

pub async fn write_frame<S: AsyncWrite + Unpin>(
    s: &mut S,
    frame_type: u8,
    flags: u8,
    stream_id: u32,
    payload: &[u8],
) {
    let mut buf = Vec::with_capacity(9 + payload.len());
    buf.extend_from_slice(&[
        (payload.len() >> 16) as u8,
        (payload.len() >> 8) as u8,
        payload.len() as u8,
        frame_type,
        flags,
    ]);
    buf.extend_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
    buf.extend_from_slice(payload);
    s.write_all(&buf).await.unwrap();
}

/// Serialize SETTINGS parameters.
pub fn settings_payload(settings: &[(u16, u32)]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(settings.len() * 6);
    for &(id, value) in settings {
        payload.extend_from_slice(&id.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
    }
    payload
}

/// Drive the server side of the connection preamble: read the preface,
/// send SETTINGS, then consume the client's SETTINGS-ACK, SETTINGS and
/// initial WINDOW_UPDATE, returning the window increment.
pub async fn server_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    s: &mut S,
    settings: &[(u16, u32)],
) -> u32 {
    read_preface(s).await;
    write_frame(s, TYPE_SETTINGS, 0, 0, &settings_payload(settings)).await;

    let ack = read_frame(s).await;
    assert_eq!(ack.frame_type, TYPE_SETTINGS);
    assert_eq!(ack.flags & FLAG_ACK, FLAG_ACK);

    let client_settings = read_frame(s).await;
    assert_eq!(client_settings.frame_type, TYPE_SETTINGS);
    assert_eq!(client_settings.payload.len(), 18);

    let window_update = read_frame(s).await;
    assert_eq!(window_update.frame_type, TYPE_WINDOW_UPDATE);
    assert_eq!(window_update.stream_id, 0);
    u32::from_be_bytes(window_update.payload[..4].try_into().unwrap()) & 0x7fff_ffff
}
