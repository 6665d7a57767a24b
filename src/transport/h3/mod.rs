//! HTTP/3 client transport (RFC 9114).
//!
//! Layered on a QUIC connection the caller has already handshaked with
//! ALPN `h3`. The transport opens the client control stream, accepts
//! the peer's, and runs one exchange on one bidirectional stream. The
//! request body is written by a background task because the peer may
//! start responding before the upload finishes.

mod frame;
pub mod qpack;

pub use frame::{
    parse_settings, read_frame_header, FrameHeader, Setting, FRAME_DATA, FRAME_HEADERS,
    FRAME_SETTINGS, STREAM_CONTROL,
};

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::headers::Header;
use crate::request::Request;
use crate::transport::{ensure_live, READ_BUF_SIZE};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// H3_NO_ERROR: used when stopping the response stream after a clean
/// read.
const H3_NO_ERROR: u32 = 0x0100;

/// H3_INTERNAL_ERROR: used to abort the connection when the body
/// writer fails, so the response reader observes the failure too.
const H3_INTERNAL_ERROR: u32 = 0x0102;

/// Upper bound on a response field section we are willing to buffer.
const MAX_FIELD_SECTION_SIZE: u64 = 256 * 1024;

/// HTTP/3 transport for one exchange on a caller-owned QUIC connection.
///
/// Both control streams are held open for the transport's lifetime;
/// dropping them early would read as a closed critical stream to the
/// peer.
pub struct H3Transport {
    conn: quinn::Connection,
    control: Option<quinn::SendStream>,
    peer_control: Option<quinn::RecvStream>,
    recv: Option<quinn::RecvStream>,
}

impl H3Transport {
    pub fn new(conn: quinn::Connection) -> Self {
        Self {
            conn,
            control: None,
            peer_control: None,
            recv: None,
        }
    }

    /// Establish both control streams.
    ///
    /// Opens our unidirectional control stream carrying an empty
    /// SETTINGS frame, then accepts the peer's control stream and reads
    /// its SETTINGS, emitting each parameter through `on_setting`. Any
    /// other first frame on the control stream is fatal.
    pub async fn start<F>(&mut self, cancel: &CancellationToken, mut on_setting: F) -> Result<()>
    where
        F: FnMut(&Setting),
    {
        if self.control.is_some() || self.peer_control.is_some() {
            return Err(Error::usage("start() already ran"));
        }
        ensure_live(cancel)?;

        let mut control = with_cancel(cancel, self.conn.open_uni())
            .await?
            .map_err(into_io)?;
        let mut startup = Vec::with_capacity(3);
        crate::wire::put_varint(STREAM_CONTROL, &mut startup);
        startup.extend_from_slice(&FrameHeader::encode(FRAME_SETTINGS, 0));
        with_cancel(cancel, control.write_all(&startup))
            .await?
            .map_err(into_io)?;
        self.control = Some(control);

        let mut peer = with_cancel(cancel, self.conn.accept_uni())
            .await?
            .map_err(into_io)?;
        let stream_type = with_cancel(cancel, crate::wire::read_varint(&mut peer)).await??;
        if stream_type != STREAM_CONTROL {
            return Err(Error::protocol("expected control stream"));
        }

        let header = with_cancel(cancel, frame::read_frame_header(&mut peer))
            .await??
            .ok_or_else(|| Error::wire("control stream ended before SETTINGS"))?;
        debug!(%header, "peer control stream");
        if header.frame_type != FRAME_SETTINGS {
            return Err(Error::protocol("expected SETTINGS frame"));
        }
        if header.length > MAX_FIELD_SECTION_SIZE {
            return Err(Error::wire("SETTINGS frame too large"));
        }
        let payload = read_exact_into(cancel, &mut peer, header.length).await?;
        for setting in frame::parse_settings(&payload)? {
            debug!(%setting, "peer setting");
            on_setting(&setting);
        }
        self.peer_control = Some(peer);
        Ok(())
    }

    /// QPACK-encode the request head onto a fresh bidirectional stream
    /// and start the body writer.
    ///
    /// Without a body the send side is half-closed immediately. With
    /// one, a background task DATA-frames each body read and
    /// half-closes on end-of-stream; a failed write aborts the whole
    /// QUIC connection so the response reader sees it.
    pub async fn write_request(
        &mut self,
        cancel: &CancellationToken,
        req: &mut Request,
    ) -> Result<()> {
        if self.control.is_none() {
            return Err(Error::usage("start() must run before write_request()"));
        }
        if self.recv.is_some() {
            return Err(Error::usage("request already written"));
        }
        if req.authority.is_empty() {
            return Err(Error::usage(":authority is required for HTTP/3"));
        }
        if req.path.is_empty() {
            return Err(Error::usage("request path is empty"));
        }

        let mut encoder = qpack::Encoder::new();
        let mut fields: Vec<(Vec<u8>, Vec<u8>)> = vec![
            (b":authority".to_vec(), req.authority.clone().into_bytes()),
            (b":method".to_vec(), req.method.as_str().as_bytes().to_vec()),
            (b":path".to_vec(), req.path.clone().into_bytes()),
            (b":scheme".to_vec(), req.scheme.as_str().as_bytes().to_vec()),
        ];
        for h in &req.headers {
            fields.push((
                h.name.to_ascii_lowercase().into_bytes(),
                h.value.clone().into_bytes(),
            ));
        }
        let borrowed: Vec<(&[u8], &[u8])> = fields
            .iter()
            .map(|(n, v)| (n.as_slice(), v.as_slice()))
            .collect();
        let section = encoder.encode(&borrowed);

        ensure_live(cancel)?;
        let (mut send, recv) = with_cancel(cancel, self.conn.open_bi())
            .await?
            .map_err(into_io)?;
        self.recv = Some(recv);

        let mut head = FrameHeader::encode(FRAME_HEADERS, section.len() as u64);
        head.extend_from_slice(&section);
        with_cancel(cancel, send.write_all(&head))
            .await?
            .map_err(into_io)?;

        let content_length = req.effective_content_length();
        let mut body = req.body.take();
        let has_body = body.is_some() && !req.method.is_head() && content_length != 0;
        if !has_body {
            if let Some(body) = body.as_mut() {
                body.release();
            }
            let _ = send.finish();
            return Ok(());
        }

        let mut body = match body.take() {
            Some(body) => body,
            None => return Ok(()),
        };
        let conn = self.conn.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUF_SIZE];
            loop {
                if cancel.is_cancelled() {
                    conn.close(H3_INTERNAL_ERROR.into(), b"request cancelled");
                    return;
                }
                let n = match body.read(&mut buf).await {
                    Ok(0) => {
                        let _ = send.finish();
                        return;
                    }
                    Ok(n) => n,
                    Err(err) => {
                        debug!(%err, "request body source failed");
                        conn.close(H3_INTERNAL_ERROR.into(), b"request body read failed");
                        return;
                    }
                };
                let mut data = FrameHeader::encode(FRAME_DATA, n as u64);
                data.extend_from_slice(&buf[..n]);
                if let Err(err) = send.write_all(&data).await {
                    debug!(%err, "request body write failed");
                    conn.close(H3_INTERNAL_ERROR.into(), b"request body write failed");
                    return;
                }
            }
        });
        Ok(())
    }

    /// Read frames until the response HEADERS frame, skipping unknown
    /// frame types, and feed the decoded fields to `sink`.
    pub async fn read_response<F>(&mut self, cancel: &CancellationToken, mut sink: F) -> Result<()>
    where
        F: FnMut(&Header),
    {
        let recv = self
            .recv
            .as_mut()
            .ok_or_else(|| Error::usage("write_request() must run before read_response()"))?;

        loop {
            ensure_live(cancel)?;
            let header = with_cancel(cancel, frame::read_frame_header(recv))
                .await??
                .ok_or_else(|| Error::wire("stream ended before response headers"))?;
            debug!(%header, "response stream");
            if header.frame_type != FRAME_HEADERS {
                discard(cancel, recv, header.length).await?;
                continue;
            }
            if header.length > MAX_FIELD_SECTION_SIZE {
                return Err(Error::wire("response field section too large"));
            }
            let section = read_exact_into(cancel, recv, header.length).await?;
            qpack::decode(&section, |name, value| {
                sink(&Header::new(
                    String::from_utf8_lossy(name),
                    String::from_utf8_lossy(value),
                ));
            })?;
            return Ok(());
        }
    }

    /// Copy DATA frame payloads into `out` until the stream finishes,
    /// skipping unknown frame types. The receive side is stopped on
    /// exit.
    pub async fn read_body<W>(&mut self, cancel: &CancellationToken, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut recv = self
            .recv
            .take()
            .ok_or_else(|| Error::usage("write_request() must run before read_body()"))?;
        let result = copy_body(cancel, &mut recv, out).await;
        let _ = recv.stop(H3_NO_ERROR.into());
        result
    }
}

async fn copy_body<W>(
    cancel: &CancellationToken,
    recv: &mut quinn::RecvStream,
    out: &mut W,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        ensure_live(cancel)?;
        let header = match with_cancel(cancel, frame::read_frame_header(recv)).await?? {
            None => {
                out.flush().await?;
                return Ok(());
            }
            Some(header) => header,
        };
        if header.frame_type != FRAME_DATA {
            debug!(%header, "skipping frame while reading body");
            discard(cancel, recv, header.length).await?;
            continue;
        }
        let mut remaining = header.length;
        while remaining > 0 {
            ensure_live(cancel)?;
            let take = remaining.min(buf.len() as u64) as usize;
            let n = with_cancel(cancel, recv.read(&mut buf[..take]))
                .await?
                .map_err(into_io)?
                .ok_or_else(|| Error::wire("stream ended inside DATA frame"))?;
            out.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
    }
}

/// Read and drop `len` payload bytes of a frame we do not interpret.
async fn discard(cancel: &CancellationToken, recv: &mut quinn::RecvStream, len: u64) -> Result<()> {
    let mut buf = [0u8; 4096];
    let mut remaining = len;
    while remaining > 0 {
        ensure_live(cancel)?;
        let take = remaining.min(buf.len() as u64) as usize;
        let n = with_cancel(cancel, recv.read(&mut buf[..take]))
            .await?
            .map_err(into_io)?
            .ok_or_else(|| Error::wire("stream ended inside skipped frame"))?;
        remaining -= n as u64;
    }
    Ok(())
}

/// Read exactly `len` bytes, treating a short stream as malformed: a
/// frame must never claim more payload than its stream carries.
async fn read_exact_into(
    cancel: &CancellationToken,
    recv: &mut quinn::RecvStream,
    len: u64,
) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; len as usize];
    let mut filled = 0usize;
    while filled < payload.len() {
        ensure_live(cancel)?;
        let n = with_cancel(cancel, recv.read(&mut payload[filled..]))
            .await?
            .map_err(into_io)?
            .ok_or_else(|| Error::wire("stream ended inside frame payload"))?;
        filled += n;
    }
    Ok(payload)
}

/// Race a future against the cancellation signal, so a blocked QUIC
/// read or write unblocks the moment the caller cancels.
async fn with_cancel<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output>
where
    F: Future,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        output = fut => Ok(output),
    }
}

fn into_io(err: impl Into<std::io::Error>) -> Error {
    Error::Io(err.into())
}
