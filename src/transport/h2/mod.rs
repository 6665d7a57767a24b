//! HTTP/2 client transport (RFC 9113).
//!
//! Binary framing and HPACK over any `AsyncRead + AsyncWrite` stream
//! the caller has already connected and ALPN-negotiated. One instance
//! drives one exchange on the fixed stream 1; `MAX_CONCURRENT_STREAMS`
//! is advertised as 1 to match.

mod frame;
pub mod hpack;

pub use frame::{Setting, CONNECTION_PREFACE, MAX_FRAME_SIZE};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::headers::Header;
use crate::request::Request;
use crate::transport::{ensure_live, READ_BUF_SIZE};

use frame::{
    error_code_name, settings, ContinuationFrame, DataFrame, FrameHeader, FrameType, GoAwayFrame,
    HeadersFrame, PingFrame, RstStreamFrame, SettingsFrame, WindowUpdateFrame, FRAME_HEADER_SIZE,
};

/// The receive window we advertise for both the connection and the
/// stream.
pub const INITIAL_WINDOW_SIZE: u32 = 10 * 1024 * 1024;

/// Replenish once more than three quarters of the window is consumed.
const WINDOW_UPDATE_THRESHOLD: u32 = INITIAL_WINDOW_SIZE / 4 * 3;

/// RFC 9113 default window before any SETTINGS/WINDOW_UPDATE applies.
const DEFAULT_WINDOW_SIZE: u32 = 65535;

/// The one stream this transport ever opens.
const STREAM_ID: u32 = 1;

/// Exchange progress. Operations must be called in this order;
/// transitions happen on frame receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    New,
    PrefaceSent,
    ServerSettingsReceived,
    RequestSent,
    ResponseHeadersReceived,
    ResponseBodyReceived,
    Done,
}

/// HTTP/2 transport over a borrowed bidirectional stream.
pub struct H2Transport<S> {
    stream: S,
    state: ExchangeState,
    /// Our remaining receive window for the response body.
    window: u32,
}

impl<S> H2Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            state: ExchangeState::New,
            window: INITIAL_WINDOW_SIZE,
        }
    }

    /// Exchange the connection preamble.
    ///
    /// Sends the client preface, waits for the server SETTINGS frame
    /// (emitting each parameter through `on_setting`), acknowledges it,
    /// then sends our SETTINGS and raises the connection window to the
    /// stream window we advertise.
    pub async fn start<F>(&mut self, cancel: &CancellationToken, mut on_setting: F) -> Result<()>
    where
        F: FnMut(&Setting),
    {
        self.expect_state(ExchangeState::New)?;
        ensure_live(cancel)?;
        self.stream.write_all(CONNECTION_PREFACE).await?;
        self.stream.flush().await?;
        self.state = ExchangeState::PrefaceSent;

        loop {
            ensure_live(cancel)?;
            let (header, payload) = self.read_frame().await?;
            match header.frame_type {
                FrameType::Settings => {
                    let frame = SettingsFrame::parse(header.flags, payload);
                    for setting in &frame.settings {
                        on_setting(setting);
                    }
                    self.write_frame(SettingsFrame::ack().serialize()).await?;
                    break;
                }
                FrameType::GoAway => return Err(goaway_error(payload)),
                FrameType::RstStream => return Err(rst_error(header.stream_id, payload)),
                other => debug!(frame = ?other, "ignoring frame before server SETTINGS"),
            }
        }

        let mut ours = SettingsFrame::new();
        ours.set(settings::INITIAL_WINDOW_SIZE, INITIAL_WINDOW_SIZE)
            .set(settings::MAX_CONCURRENT_STREAMS, 1)
            .set(settings::MAX_FRAME_SIZE, MAX_FRAME_SIZE);
        self.write_frame(ours.serialize()).await?;

        // The connection starts at the 65535-octet default; top it up so
        // connection credit equals the stream window we advertise.
        let increment = INITIAL_WINDOW_SIZE - DEFAULT_WINDOW_SIZE;
        self.write_frame(WindowUpdateFrame::new(0, increment).serialize()).await?;

        self.state = ExchangeState::ServerSettingsReceived;
        Ok(())
    }

    /// HPACK-encode and send the request head, then stream the body as
    /// DATA frames.
    ///
    /// Pseudo-headers go first in the order `:authority, :method,
    /// :path, :scheme`; caller header names are lowercased. The HEADERS
    /// frame carries END_STREAM when there is no body; otherwise the
    /// DATA frame following the body's end-of-stream does.
    pub async fn write_request(
        &mut self,
        cancel: &CancellationToken,
        req: &mut Request,
    ) -> Result<()> {
        self.expect_state(ExchangeState::ServerSettingsReceived)?;
        if req.authority.is_empty() {
            return Err(Error::usage(":authority is required for HTTP/2"));
        }
        if req.path.is_empty() {
            return Err(Error::usage("request path is empty"));
        }

        let mut encoder = hpack::Encoder::new();
        let mut block = Vec::new();
        encoder.encode_field(b":authority", req.authority.as_bytes(), &mut block);
        encoder.encode_field(b":method", req.method.as_str().as_bytes(), &mut block);
        encoder.encode_field(b":path", req.path.as_bytes(), &mut block);
        encoder.encode_field(b":scheme", req.scheme.as_str().as_bytes(), &mut block);
        for h in &req.headers {
            let name = h.name.to_ascii_lowercase();
            encoder.encode_field(name.as_bytes(), h.value.as_bytes(), &mut block);
        }
        if block.len() > MAX_FRAME_SIZE as usize {
            return Err(Error::usage("header block exceeds maximum frame size"));
        }

        let content_length = req.effective_content_length();
        let mut body = req.body.take();
        let has_body = body.is_some() && !req.method.is_head() && content_length != 0;

        ensure_live(cancel)?;
        let headers = HeadersFrame::new(STREAM_ID, Bytes::from(block)).end_stream(!has_body);
        self.write_frame(headers.serialize()).await?;

        if let Some(mut body) = body.take() {
            if has_body {
                let mut buf = vec![0u8; READ_BUF_SIZE];
                loop {
                    ensure_live(cancel)?;
                    let n = body.read(&mut buf).await?;
                    let data = DataFrame::new(STREAM_ID, Bytes::copy_from_slice(&buf[..n]))
                        .end_stream(n == 0);
                    self.write_frame(data.serialize()).await?;
                    if n == 0 {
                        break;
                    }
                }
            }
            body.release();
        }

        self.state = ExchangeState::RequestSent;
        Ok(())
    }

    /// Read frames until the response header block completes, feeding
    /// every decoded field to `sink` in wire order.
    pub async fn read_response<F>(&mut self, cancel: &CancellationToken, mut sink: F) -> Result<()>
    where
        F: FnMut(&Header),
    {
        self.expect_state(ExchangeState::RequestSent)?;
        let mut decoder = hpack::Decoder::new();
        let mut block = BytesMut::new();
        let mut in_headers = false;

        loop {
            ensure_live(cancel)?;
            let (header, payload) = self.read_frame().await?;
            let done = match header.frame_type {
                FrameType::Headers => {
                    let frame = HeadersFrame::parse(header.stream_id, header.flags, payload)
                        .map_err(Error::wire)?;
                    block.extend_from_slice(&frame.header_block);
                    in_headers = true;
                    frame.end_headers
                }
                FrameType::Continuation if in_headers => {
                    let frame = ContinuationFrame::parse(header.stream_id, header.flags, payload)
                        .map_err(Error::wire)?;
                    block.extend_from_slice(&frame.header_fragment);
                    frame.end_headers
                }
                FrameType::WindowUpdate => {
                    log_window_update(header.stream_id, payload);
                    false
                }
                FrameType::GoAway => return Err(goaway_error(payload)),
                FrameType::RstStream => return Err(rst_error(header.stream_id, payload)),
                other => {
                    debug!(frame = ?other, "ignoring frame while awaiting response headers");
                    false
                }
            };
            if done {
                break;
            }
        }

        decoder.decode(&block, |name, value| {
            sink(&Header::new(
                String::from_utf8_lossy(name),
                String::from_utf8_lossy(value),
            ));
        })?;
        self.state = ExchangeState::ResponseHeadersReceived;
        Ok(())
    }

    /// Stream DATA frames into `out` until END_STREAM, maintaining our
    /// receive window.
    ///
    /// Once more than three quarters of the window is consumed, a
    /// WINDOW_UPDATE for the consumed amount goes out on both the
    /// connection and the stream. PINGs are echoed; GOAWAY and
    /// RST_STREAM abort the exchange.
    pub async fn read_body<W>(&mut self, cancel: &CancellationToken, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.expect_state(ExchangeState::ResponseHeadersReceived)?;
        loop {
            ensure_live(cancel)?;
            let (header, payload) = self.read_frame().await?;
            match header.frame_type {
                FrameType::Data => {
                    let frame = DataFrame::parse(header.stream_id, header.flags, payload)
                        .map_err(Error::wire)?;
                    out.write_all(&frame.data).await?;

                    // Account the full frame length, padding included.
                    self.window = self.window.checked_sub(header.length).ok_or_else(|| {
                        Error::protocol("peer overran the advertised flow-control window")
                    })?;
                    if self.window <= INITIAL_WINDOW_SIZE - WINDOW_UPDATE_THRESHOLD {
                        let increment = INITIAL_WINDOW_SIZE - self.window;
                        self.stream
                            .write_all(&WindowUpdateFrame::new(0, increment).serialize())
                            .await?;
                        self.stream
                            .write_all(&WindowUpdateFrame::new(header.stream_id, increment).serialize())
                            .await?;
                        self.stream.flush().await?;
                        self.window = INITIAL_WINDOW_SIZE;
                    }

                    if frame.end_stream {
                        out.flush().await?;
                        self.state = ExchangeState::ResponseBodyReceived;
                        break;
                    }
                }
                FrameType::Ping => {
                    let ping = PingFrame::parse(header.flags, &payload)
                        .ok_or_else(|| Error::wire("malformed PING frame"))?;
                    if ping.ack {
                        debug!("received PING ACK");
                    } else {
                        self.write_frame(PingFrame::ack(ping.data).serialize()).await?;
                    }
                }
                FrameType::WindowUpdate => log_window_update(header.stream_id, payload),
                FrameType::GoAway => return Err(goaway_error(payload)),
                FrameType::RstStream => return Err(rst_error(header.stream_id, payload)),
                other => debug!(frame = ?other, "ignoring frame while reading body"),
            }
        }
        self.state = ExchangeState::Done;
        Ok(())
    }

    async fn read_frame(&mut self) -> Result<(FrameHeader, Bytes)> {
        let mut head = [0u8; FRAME_HEADER_SIZE];
        self.stream.read_exact(&mut head).await?;
        let header = FrameHeader::parse(&head);
        if header.length > MAX_FRAME_SIZE {
            return Err(Error::wire(format!(
                "frame of {} bytes exceeds our MAX_FRAME_SIZE",
                header.length
            )));
        }
        let mut payload = vec![0u8; header.length as usize];
        self.stream.read_exact(&mut payload).await?;
        Ok((header, Bytes::from(payload)))
    }

    async fn write_frame(&mut self, buf: BytesMut) -> Result<()> {
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn expect_state(&self, want: ExchangeState) -> Result<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(Error::usage(format!(
                "operation out of order: exchange is {:?}, expected {:?}",
                self.state, want
            )))
        }
    }
}

fn goaway_error(payload: Bytes) -> Error {
    match GoAwayFrame::parse(payload) {
        Some(frame) => Error::protocol(format!(
            "GOAWAY: last_stream={} code={} debug={:?}",
            frame.last_stream_id,
            error_code_name(frame.error_code),
            String::from_utf8_lossy(&frame.debug_data),
        )),
        None => Error::wire("malformed GOAWAY frame"),
    }
}

fn rst_error(stream_id: u32, payload: Bytes) -> Error {
    match RstStreamFrame::parse(stream_id, payload) {
        Some(frame) => Error::protocol(format!(
            "RST_STREAM: stream={} code={}",
            frame.stream_id,
            error_code_name(frame.error_code),
        )),
        None => Error::wire("malformed RST_STREAM frame"),
    }
}

fn log_window_update(stream_id: u32, payload: Bytes) {
    if let Some(frame) = WindowUpdateFrame::parse(stream_id, payload) {
        debug!(
            stream = frame.stream_id,
            increment = frame.increment,
            "ignoring WINDOW_UPDATE"
        );
    }
}
