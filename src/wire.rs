//! Byte-level wire primitives shared by the three transports.
//!
//! Case folding and the numeric parsers operate on raw bytes because
//! header names and chunk sizes arrive as bytes, not validated UTF-8.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

pub const CRLF: &[u8] = b"\r\n";

/// Fold one ASCII byte to lowercase. Non-ASCII bytes pass through.
#[inline]
pub fn fold(b: u8) -> u8 {
    if b.is_ascii_uppercase() {
        b + 0x20
    } else {
        b
    }
}

/// ASCII-case-insensitive equality over raw bytes.
pub fn eq_fold(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| fold(*x) == fold(*y))
}

/// Uppercase an ASCII string, leaving non-ASCII bytes untouched.
pub fn to_upper(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_uppercase() } else { c })
        .collect()
}

/// Parse a non-empty ASCII decimal byte string into a non-negative
/// 64-bit integer. Fails on empty input, a leading '-', or any
/// non-digit byte.
pub fn atoi64(s: &[u8]) -> Option<i64> {
    if s.is_empty() || s[0] == b'-' {
        return None;
    }
    let mut n: i64 = 0;
    for &c in s {
        if !c.is_ascii_digit() {
            return None;
        }
        n = n.checked_mul(10)?.checked_add((c - b'0') as i64)?;
    }
    Some(n)
}

/// Append `n` as lowercase hex with no leading zeros. `0` encodes as "0".
pub fn append_hex(n: u64, buf: &mut Vec<u8>) {
    if n == 0 {
        buf.push(b'0');
        return;
    }
    let digits = (64 - n.leading_zeros() as usize).div_ceil(4);
    let start = buf.len();
    buf.resize(start + digits, 0);
    let mut n = n;
    for i in (0..digits).rev() {
        let d = (n & 0xf) as u8;
        buf[start + i] = if d < 10 { b'0' + d } else { b'a' + d - 10 };
        n >>= 4;
    }
}

/// Parse up to 16 hex digits (either case) into an i64.
///
/// Fails on empty input, more than 16 digits, an invalid character, or
/// a value that outgrows the 60-bit workspace before the final shift.
pub fn hex_to_int(s: &[u8]) -> Result<i64> {
    if s.is_empty() {
        return Err(Error::wire("empty hex string"));
    }
    if s.len() > 16 {
        return Err(Error::wire("hex string too long (max 16 digits)"));
    }
    let mut n: i64 = 0;
    for &c in s {
        if n > (1 << 60) - 1 {
            return Err(Error::wire("hex value too large"));
        }
        n *= 16;
        n += match c {
            b'0'..=b'9' => (c - b'0') as i64,
            b'a'..=b'f' => (c - b'a' + 10) as i64,
            b'A'..=b'F' => (c - b'A' + 10) as i64,
            _ => return Err(Error::wire(format!("invalid hex character: {:?}", c as char))),
        };
    }
    Ok(n)
}

/// Strip leading and trailing ASCII whitespace.
pub fn trim_ascii(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|b| !b.is_ascii_whitespace());
    match start {
        None => &[],
        Some(start) => {
            let end = s.iter().rposition(|b| !b.is_ascii_whitespace()).unwrap();
            &s[start..=end]
        }
    }
}

/// Read one line, up to and including the next LF.
///
/// The returned buffer keeps its trailing CRLF. EOF before the LF is a
/// malformed-wire error: a peer never legitimately closes mid-line.
pub async fn read_line<R: AsyncBufRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    r.read_until(b'\n', &mut line).await?;
    if line.last() != Some(&b'\n') {
        return Err(Error::wire("unexpected end of stream inside a line"));
    }
    Ok(line)
}

/// Largest value a QUIC variable-length integer can carry (2^62 - 1).
pub const VARINT_MAX: u64 = (1 << 62) - 1;

/// Number of bytes the varint encoding of `v` occupies.
pub fn varint_size(v: u64) -> usize {
    match v {
        0..=0x3f => 1,
        0x40..=0x3fff => 2,
        0x4000..=0x3fff_ffff => 4,
        _ => 8,
    }
}

/// Append the QUIC varint encoding of `v` (RFC 9000 Section 16).
///
/// Values above [`VARINT_MAX`] are not encodable; callers only ever pass
/// buffer lengths, which fit comfortably.
pub fn put_varint(v: u64, buf: &mut Vec<u8>) {
    debug_assert!(v <= VARINT_MAX);
    match varint_size(v) {
        1 => buf.push(v as u8),
        2 => buf.extend_from_slice(&(v as u16 | 0x4000).to_be_bytes()),
        4 => buf.extend_from_slice(&(v as u32 | 0x8000_0000).to_be_bytes()),
        _ => buf.extend_from_slice(&(v | 0xc000_0000_0000_0000).to_be_bytes()),
    }
}

/// Decode one varint from the front of `buf`, returning the value and
/// the number of bytes consumed, or None if `buf` is too short.
pub fn get_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let first = *buf.first()?;
    let len = 1usize << (first >> 6);
    if buf.len() < len {
        return None;
    }
    let mut v = (first & 0x3f) as u64;
    for &b in &buf[1..len] {
        v = (v << 8) | b as u64;
    }
    Some((v, len))
}

/// Read one varint from an async stream. EOF anywhere inside the
/// encoding, including before the first byte, is a malformed-wire error.
pub async fn read_varint<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64> {
    match try_read_varint(r).await? {
        Some(v) => Ok(v),
        None => Err(Error::wire("unexpected end of stream reading varint")),
    }
}

/// Read one varint, distinguishing a clean EOF before the first byte
/// (`Ok(None)`) from EOF mid-encoding (malformed-wire).
pub async fn try_read_varint<R: AsyncRead + Unpin>(r: &mut R) -> Result<Option<u64>> {
    let mut first = [0u8; 1];
    if r.read(&mut first).await? == 0 {
        return Ok(None);
    }
    let len = 1usize << (first[0] >> 6);
    let mut v = (first[0] & 0x3f) as u64;
    let mut rest = [0u8; 7];
    let rest = &mut rest[..len - 1];
    if !rest.is_empty() {
        r.read_exact(rest).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::wire("unexpected end of stream reading varint")
            } else {
                Error::Io(e)
            }
        })?;
        for &b in rest.iter() {
            v = (v << 8) | b as u64;
        }
    }
    Ok(Some(v))
}
