//! HPACK header compression (RFC 7541).
//!
//! Complete implementation: prefix integers and the Huffman codec come
//! from the shared transport modules, the static and dynamic tables and
//! the encoder/decoder live here. Dynamic table size is 4096 octets on
//! both sides, matching the SETTINGS this crate never changes.

mod decoder;
mod dynamic_table;
mod encoder;
mod static_table;

pub use decoder::Decoder;
pub use encoder::Encoder;
