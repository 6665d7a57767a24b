//! HTTP transport implementations.
//!
//! - HTTP/1.1: text framing over any `AsyncRead + AsyncWrite` stream
//! - HTTP/2: binary framing and HPACK over the same
//! - HTTP/3: varint framing and QPACK over a handshaked QUIC connection

pub mod h1;
pub mod h2;
pub mod h3;

mod huffman;
mod prefix_int;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Shared read-buffer size for body copies across transports.
pub(crate) const READ_BUF_SIZE: usize = 32 * 1024;

/// Poll the caller-supplied cancellation signal. Every transport calls
/// this before a suspension point and at each copy-loop iteration.
pub(crate) fn ensure_live(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
