//! # wraith
//!
//! Wire-level HTTP client transports: one request/response exchange over
//! HTTP/1.1, HTTP/2 or HTTP/3, on a connection the caller has already
//! dialed and handshaked.
//!
//! Each transport owns exactly the wire work — framing, header
//! compression, flow control, body encoding, trailers — and nothing
//! else. URL parsing, DNS, TLS/QUIC handshakes, redirects and content
//! decoding belong to the caller, which also owns connection teardown
//! and reuse decisions.

// Shared model
pub mod error;
pub mod headers;
pub mod request;
pub mod wire;

// Transport layer
pub mod transport;

// Re-exports for convenient access
pub use error::{Error, Result};
pub use headers::{Header, Headers};
pub use request::{Body, Method, Request, Scheme};

// Transport re-exports
pub use transport::h1::H1Transport;
pub use transport::h2::H2Transport;
pub use transport::h3::H3Transport;
