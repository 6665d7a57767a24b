//! N-bit-prefix integer coding (RFC 7541 Section 5.1).
//!
//! HPACK and QPACK share this representation: an integer starts in the
//! low bits of a tag octet and continues in 7-bit groups while the high
//! bit is set.

use crate::error::{Error, Result};

/// Encode `value` with an N-bit prefix. `tag` carries the
/// representation's pattern bits in the high positions and is OR-ed with
/// the prefix value.
pub fn encode(tag: u8, prefix_bits: u8, value: usize, out: &mut Vec<u8>) {
    debug_assert!((1..=8).contains(&prefix_bits));
    let max_prefix = (1usize << prefix_bits) - 1;

    if value < max_prefix {
        out.push(tag | value as u8);
        return;
    }

    out.push(tag | max_prefix as u8);
    let mut rest = value - max_prefix;
    while rest >= 128 {
        out.push((rest % 128 + 128) as u8);
        rest /= 128;
    }
    out.push(rest as u8);
}

/// Decode an integer with an N-bit prefix from the front of `data`.
///
/// Returns (value, total bytes consumed).
pub fn decode(data: &[u8], prefix_bits: u8) -> Result<(usize, usize)> {
    debug_assert!((1..=8).contains(&prefix_bits));
    let first = *data
        .first()
        .ok_or_else(|| Error::wire("truncated prefixed integer"))?;

    let max_prefix = (1usize << prefix_bits) - 1;
    let prefix = first as usize & max_prefix;
    if prefix < max_prefix {
        return Ok((prefix, 1));
    }

    let mut value = max_prefix;
    let mut shift = 0u32;
    for (i, &byte) in data[1..].iter().enumerate() {
        value += ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 2));
        }
        shift += 7;
        if shift > 28 {
            return Err(Error::wire("prefixed integer overflow"));
        }
    }
    Err(Error::wire("truncated prefixed integer"))
}
