//! HTTP/1.1 client transport (RFC 9112).
//!
//! Text framing over any `AsyncRead + AsyncWrite` pair the caller has
//! already connected. One instance drives one request/response
//! exchange; keep-alive means the caller may run another exchange on
//! the same connection with a fresh transport.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::headers::Header;
use crate::request::{Body, Request, CONTENT_LENGTH_UNKNOWN};
use crate::transport::{ensure_live, READ_BUF_SIZE};
use crate::wire::{self, CRLF};

const PROTO_HTTP11: &str = "HTTP/1.1";

/// HTTP/1.1 transport over a borrowed reader/writer pair.
///
/// The caller owns the connection and its teardown; pass `&mut` halves
/// to keep them.
pub struct H1Transport<R, W> {
    reader: BufReader<R>,
    writer: W,
    /// Response framing: body length, or -1 for chunked/unknown.
    content_length: i64,
    is_head: bool,
}

impl<R, W> H1Transport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            content_length: CONTENT_LENGTH_UNKNOWN,
            is_head: false,
        }
    }

    /// Serialise the request head and stream the body.
    ///
    /// `trace` fires once per header as it is written, including the
    /// synthetic `:method`, `:path` and `:proto` pseudo-headers that
    /// give the caller a uniform view across protocols.
    ///
    /// Framing: a caller Content-Length header is adopted when the
    /// request carries no length of its own; `Transfer-Encoding:
    /// chunked` selects chunked framing; both together is an error.
    /// A body of unknown length gets `Transfer-Encoding: chunked`
    /// injected.
    pub async fn write_request<F>(
        &mut self,
        cancel: &CancellationToken,
        req: &mut Request,
        mut trace: F,
    ) -> Result<()>
    where
        F: FnMut(&Header),
    {
        if req.path.is_empty() {
            return Err(Error::usage("request path is empty"));
        }

        let mut content_length = req.effective_content_length();
        let mut body = req.body.take();

        trace(&Header::new(":method", req.method.as_str()));
        trace(&Header::new(":path", req.path.as_str()));
        trace(&Header::new(":proto", PROTO_HTTP11));

        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(req.method.as_str().as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(req.path.as_bytes());
        buf.push(b' ');
        buf.extend_from_slice(PROTO_HTTP11.as_bytes());
        buf.extend_from_slice(CRLF);

        if !req.authority.is_empty() {
            let host = Header::new("Host", req.authority.as_str());
            write_header(&mut buf, &host);
            trace(&host);
        }

        let mut has_transfer_encoding = false;
        for h in &req.headers {
            write_header(&mut buf, h);
            trace(h);
            if h.is("content-length") {
                if has_transfer_encoding {
                    return Err(Error::usage(
                        "both Content-Length and Transfer-Encoding: chunked",
                    ));
                }
                if content_length == CONTENT_LENGTH_UNKNOWN {
                    if let Some(l) = wire::atoi64(h.value.as_bytes()) {
                        content_length = l;
                    }
                }
            } else if h.is("transfer-encoding") && h.value.contains("chunked") {
                if content_length > CONTENT_LENGTH_UNKNOWN {
                    return Err(Error::usage(
                        "both Content-Length and Transfer-Encoding: chunked",
                    ));
                }
                has_transfer_encoding = true;
            }
        }

        self.is_head = req.method.is_head();
        let has_body = body.is_some() && !self.is_head && content_length != 0;

        if content_length == CONTENT_LENGTH_UNKNOWN && has_body && !has_transfer_encoding {
            let te = Header::new("Transfer-Encoding", "chunked");
            write_header(&mut buf, &te);
            trace(&te);
        }

        buf.extend_from_slice(CRLF);
        ensure_live(cancel)?;
        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;

        if !has_body {
            if let Some(body) = body.as_mut() {
                body.release();
            }
            return Ok(());
        }
        let mut body = body.unwrap();

        let result = match content_length {
            CONTENT_LENGTH_UNKNOWN => self.write_chunked_body(cancel, &mut body).await,
            n => self.write_sized_body(cancel, &mut body, n).await,
        };
        body.release();
        result
    }

    async fn write_sized_body(
        &mut self,
        cancel: &CancellationToken,
        body: &mut Body,
        content_length: i64,
    ) -> Result<()> {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let mut remaining = content_length as u64;
        while remaining > 0 {
            ensure_live(cancel)?;
            let take = remaining.min(buf.len() as u64) as usize;
            let n = body.read(&mut buf[..take]).await?;
            if n == 0 {
                break;
            }
            self.writer.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn write_chunked_body(
        &mut self,
        cancel: &CancellationToken,
        body: &mut Body,
    ) -> Result<()> {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            ensure_live(cancel)?;
            let n = body.read(&mut buf).await?;
            if n == 0 {
                self.writer.write_all(b"0\r\n\r\n").await?;
                self.writer.flush().await?;
                return Ok(());
            }
            let mut head = Vec::with_capacity(18);
            wire::append_hex(n as u64, &mut head);
            head.extend_from_slice(CRLF);
            self.writer.write_all(&head).await?;
            self.writer.write_all(&buf[..n]).await?;
            self.writer.write_all(CRLF).await?;
            // Flush per chunk so a slow producer still makes progress.
            self.writer.flush().await?;
        }
    }

    /// Read the status line and header block.
    ///
    /// The sink sees `:proto` and `:status` first (the status value
    /// keeps its reason phrase), then each header in wire order.
    pub async fn read_response<F>(&mut self, cancel: &CancellationToken, mut sink: F) -> Result<()>
    where
        F: FnMut(&Header),
    {
        ensure_live(cancel)?;
        let line = wire::read_line(&mut self.reader).await?;
        let space = line
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| Error::wire("malformed response"))?;
        let (proto, status) = (&line[..space], &line[space + 1..]);
        sink(&Header::new(":proto", String::from_utf8_lossy(proto)));
        sink(&Header::new(
            ":status",
            String::from_utf8_lossy(wire::trim_ascii(status)),
        ));

        let mut chunked = false;
        loop {
            ensure_live(cancel)?;
            let line = wire::read_line(&mut self.reader).await?;
            if line == CRLF {
                break;
            }
            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| Error::wire("malformed headers"))?;
            let name = String::from_utf8_lossy(&line[..colon]).into_owned();
            let value = String::from_utf8_lossy(wire::trim_ascii(&line[colon + 1..])).into_owned();
            let header = Header::new(name, value);
            sink(&header);

            if header.is("content-length") {
                if chunked {
                    return Err(Error::wire(
                        "both Content-Length and Transfer-Encoding: chunked",
                    ));
                }
                self.content_length = wire::atoi64(header.value.as_bytes())
                    .ok_or_else(|| Error::wire("invalid Content-Length"))?;
            } else if header.is("transfer-encoding") && header.value.contains("chunked") {
                if self.content_length > CONTENT_LENGTH_UNKNOWN {
                    return Err(Error::wire(
                        "both Content-Length and Transfer-Encoding: chunked",
                    ));
                }
                chunked = true;
            }
        }

        // Chunked framing overrides any prior length.
        if chunked {
            self.content_length = CONTENT_LENGTH_UNKNOWN;
        }
        ensure_live(cancel)
    }

    /// Stream the response body into `out`.
    ///
    /// HEAD responses and zero-length bodies are a no-op; otherwise
    /// the framing chosen during `read_response` decides between an
    /// exact-length copy and chunk decoding.
    pub async fn read_body<S>(&mut self, cancel: &CancellationToken, out: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        if self.is_head || self.content_length == 0 {
            return ensure_live(cancel);
        }
        match self.content_length {
            CONTENT_LENGTH_UNKNOWN => self.read_chunked_body(cancel, out).await,
            _ => self.read_sized_body(cancel, out).await,
        }
    }

    async fn read_sized_body<S>(&mut self, cancel: &CancellationToken, out: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        let mut remaining = self.content_length as u64;
        while remaining > 0 {
            ensure_live(cancel)?;
            let take = remaining.min(buf.len() as u64) as usize;
            let n = self.reader.read(&mut buf[..take]).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            remaining -= n as u64;
        }
        out.flush().await?;
        Ok(())
    }

    async fn read_chunked_body<S>(&mut self, cancel: &CancellationToken, out: &mut S) -> Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            ensure_live(cancel)?;
            let line = wire::read_line(&mut self.reader).await?;
            let size_digits = match line.strip_suffix(CRLF) {
                // An empty pre-size line is tolerated as continuation.
                Some([]) => continue,
                Some(digits) => digits,
                None => return Err(Error::wire("malformed chunk encoding")),
            };
            let size = wire::hex_to_int(size_digits)?;

            // The zero-size chunk ends the body; the trailer section
            // (and its closing blank line) stays in the stream for
            // read_trailers.
            if size == 0 {
                out.flush().await?;
                return Ok(());
            }

            let mut remaining = size as u64;
            while remaining > 0 {
                ensure_live(cancel)?;
                let take = remaining.min(buf.len() as u64) as usize;
                let n = self.reader.read(&mut buf[..take]).await?;
                if n == 0 {
                    return Err(Error::wire("unexpected end of stream inside chunk"));
                }
                out.write_all(&buf[..n]).await?;
                remaining -= n as u64;
            }

            let mut crlf = [0u8; 2];
            self.reader.read_exact(&mut crlf).await?;
            if crlf != CRLF {
                return Err(Error::wire("malformed chunk encoding"));
            }
        }
    }

    /// Read the trailer section following a chunked body.
    ///
    /// A no-op unless the response used chunked framing.
    pub async fn read_trailers<F>(&mut self, cancel: &CancellationToken, mut sink: F) -> Result<()>
    where
        F: FnMut(&Header),
    {
        if self.is_head || self.content_length != CONTENT_LENGTH_UNKNOWN {
            return ensure_live(cancel);
        }
        loop {
            ensure_live(cancel)?;
            let line = wire::read_line(&mut self.reader).await?;
            if line == CRLF {
                return ensure_live(cancel);
            }
            let colon = line
                .iter()
                .position(|&b| b == b':')
                .ok_or_else(|| Error::wire("malformed headers"))?;
            let name = String::from_utf8_lossy(&line[..colon]).into_owned();
            let value = String::from_utf8_lossy(wire::trim_ascii(&line[colon + 1..])).into_owned();
            sink(&Header::new(name, value));
        }
    }
}

fn write_header(buf: &mut Vec<u8>, h: &Header) {
    buf.extend_from_slice(h.name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(h.value.as_bytes());
    buf.extend_from_slice(CRLF);
}
