//! The protocol-neutral request model: method, scheme, body source and
//! the request itself.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::headers::Headers;
use crate::wire;

/// Request method: one of the nine standard tokens or an opaque
/// upper-cased extension token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Connect,
    Options,
    Trace,
    Extension(String),
}

impl Method {
    /// Parse caller input. Empty input means GET; anything else matches
    /// the standard tokens case-insensitively or becomes an upper-cased
    /// extension token.
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::Get;
        }
        match wire::to_upper(s).as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "CONNECT" => Self::Connect,
            "OPTIONS" => Self::Options,
            "TRACE" => Self::Trace,
            upper => Self::Extension(upper.to_owned()),
        }
    }

    /// The wire token.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Extension(token) => token,
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(self, Self::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL scheme, which also fixes the default port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    /// Parse an optional port string; empty input yields the scheme's
    /// default port.
    pub fn parse_port(&self, s: &str) -> Option<u16> {
        if s.is_empty() {
            return Some(self.default_port());
        }
        let n = wire::atoi64(s.as_bytes())?;
        u16::try_from(n).ok()
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pull-source of request body bytes.
///
/// Each `read` fills up to the buffer length; a zero-length read is the
/// terminal end-of-stream signal. The optional release hook runs exactly
/// once when the transport is finished with the body, including on early
/// error paths, because it is backed by `Drop`.
pub struct Body {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    len: Option<u64>,
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl Body {
    /// Body from an async reader of unknown length.
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            len: None,
            on_release: None,
        }
    }

    /// Body from an in-memory buffer. The length is known, so HTTP/1.1
    /// sends it with Content-Length framing instead of chunking.
    pub fn from_bytes(bytes: impl Into<bytes::Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self {
            reader: Box::new(io::Cursor::new(bytes)),
            len: Some(len),
            on_release: None,
        }
    }

    /// Attach a hook invoked exactly once when the transport is done
    /// reading this body.
    pub fn with_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Known remaining length, if the source exposes one.
    pub fn len(&self) -> Option<u64> {
        self.len
    }

    /// Pull the next bytes. Zero means end-of-stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).await
    }

    /// Run the release hook now instead of waiting for drop.
    pub(crate) fn release(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
    }
}

impl Drop for Body {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body").field("len", &self.len).finish_non_exhaustive()
    }
}

/// Length value meaning "unknown".
pub const CONTENT_LENGTH_UNKNOWN: i64 = -1;

/// A single request, shared by all three transports.
///
/// `content_length` is -1 when unknown; transports may also adopt a
/// length from the body source or a caller-supplied Content-Length
/// header. The body is taken by the transport that writes it.
#[derive(Debug)]
pub struct Request {
    pub authority: String,
    pub method: Method,
    pub path: String,
    pub scheme: Scheme,
    pub headers: Headers,
    pub body: Option<Body>,
    pub content_length: i64,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            authority: String::new(),
            method,
            path: path.into(),
            scheme: Scheme::Https,
            headers: Headers::new(),
            body: None,
            content_length: CONTENT_LENGTH_UNKNOWN,
        }
    }

    /// The length the transport should frame the body with: the
    /// explicit `content_length` if set, otherwise whatever the body
    /// source knows about itself.
    pub(crate) fn effective_content_length(&self) -> i64 {
        if self.content_length != CONTENT_LENGTH_UNKNOWN {
            return self.content_length;
        }
        match self.body.as_ref().and_then(Body::len) {
            Some(n) => n as i64,
            None => CONTENT_LENGTH_UNKNOWN,
        }
    }
}
