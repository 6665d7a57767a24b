//! Error types for the wraith crate.

use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the transports.
///
/// Nothing is retried internally; every error ends the exchange and the
/// caller decides whether the connection is still usable. `Io` wraps the
/// underlying transport error unmodified so a connection reset stays
/// distinguishable from a clean close.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Syntactically invalid bytes on the wire: bad status line, bad
    /// header, bad chunk size, conflicting framing, broken HPACK/QPACK.
    #[error("malformed wire data: {0}")]
    Wire(String),

    /// The peer sent something forbidden in the current state (GOAWAY,
    /// RST_STREAM, an unexpected frame on the control stream). The
    /// connection is tainted and must not be reused.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Underlying transport read/write failure.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The caller-supplied cancellation signal fired. No further I/O
    /// was issued after the signal was observed.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller handed us a request we cannot serialise, such as both
    /// Content-Length and Transfer-Encoding: chunked.
    #[error("invalid request: {0}")]
    Usage(String),
}

impl Error {
    /// Create a malformed-wire error.
    pub fn wire(message: impl Into<String>) -> Self {
        Self::Wire(message.into())
    }

    /// Create a protocol-violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a caller-misuse error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Whether the error means the connection itself is no longer safe
    /// to reuse for another exchange.
    pub fn taints_connection(&self) -> bool {
        !matches!(self, Self::Usage(_))
    }
}
