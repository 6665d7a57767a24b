//! QPACK header compression (RFC 9204), static table only.
//!
//! Our SETTINGS advertise no decoder dynamic-table capacity, so every
//! field section we send or accept stands alone: the encoded section
//! prefix must carry a Required Insert Count of zero and no field line
//! may reference the dynamic table. That keeps both directions free of
//! the encoder/decoder streams entirely.

mod static_table;

use crate::error::{Error, Result};
use crate::transport::{huffman, prefix_int};

/// Encode a field section: the zeroed prefix, then one field line per
/// header in order.
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Append one field line.
    ///
    /// Static-table exact matches become indexed field lines, name
    /// matches become name-referenced literals, everything else a
    /// literal with a literal name. Values stay uncompressed; peers
    /// accept either and headers this client sends rarely gain from
    /// Huffman.
    pub fn encode_field(&mut self, name: &[u8], value: &[u8], out: &mut Vec<u8>) {
        if let Some(index) = static_table::find(name, value) {
            // Indexed field line, static table: 1 T=1 index(6+).
            prefix_int::encode(0xc0, 6, index, out);
            return;
        }
        match static_table::find_name(name) {
            Some(index) => {
                // Literal with static name reference: 01 N=0 T=1 index(4+).
                prefix_int::encode(0x50, 4, index, out);
            }
            None => {
                // Literal with literal name: 001 N=0 H=0 length(3+).
                prefix_int::encode(0x20, 3, name.len(), out);
                out.extend_from_slice(name);
            }
        }
        prefix_int::encode(0x00, 7, value.len(), out);
        out.extend_from_slice(value);
    }

    /// Encode a whole field section, prefix included.
    pub fn encode(&mut self, fields: &[(&[u8], &[u8])]) -> Vec<u8> {
        // Required Insert Count 0, Delta Base 0: no dynamic references.
        let mut out = vec![0x00, 0x00];
        for (name, value) in fields {
            self.encode_field(name, value, &mut out);
        }
        out
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a complete field section, emitting each field in order.
///
/// Dynamic-table references are rejected: we never open the capacity,
/// so a peer using them is violating our SETTINGS.
pub fn decode<F>(mut data: &[u8], mut emit: F) -> Result<()>
where
    F: FnMut(&[u8], &[u8]),
{
    // Encoded field section prefix (Section 4.5.1).
    let (required_insert_count, n) = prefix_int::decode(data, 8)?;
    data = &data[n..];
    if required_insert_count != 0 {
        return Err(Error::wire(
            "qpack: dynamic table referenced with zero capacity",
        ));
    }
    let (_delta_base, n) = prefix_int::decode(data, 7)?;
    data = &data[n..];

    while let Some(&first) = data.first() {
        if first & 0x80 != 0 {
            // Indexed field line: 1 T index(6+).
            if first & 0x40 == 0 {
                return Err(Error::wire("qpack: dynamic indexed field line"));
            }
            let (index, n) = prefix_int::decode(data, 6)?;
            data = &data[n..];
            let (name, value) = static_table::get(index)
                .ok_or_else(|| Error::wire(format!("qpack: invalid static index {index}")))?;
            emit(name, value);
        } else if first & 0xc0 == 0x40 {
            // Literal with name reference: 01 N T index(4+).
            if first & 0x10 == 0 {
                return Err(Error::wire("qpack: dynamic name reference"));
            }
            let (index, n) = prefix_int::decode(data, 4)?;
            data = &data[n..];
            let (name, _) = static_table::get(index)
                .ok_or_else(|| Error::wire(format!("qpack: invalid static index {index}")))?;
            let (value, n) = decode_string(data, 7)?;
            data = &data[n..];
            emit(name, &value);
        } else if first & 0xe0 == 0x20 {
            // Literal with literal name: 001 N H length(3+).
            let (name, n) = decode_string(data, 3)?;
            data = &data[n..];
            let (value, n) = decode_string(data, 7)?;
            data = &data[n..];
            emit(&name, &value);
        } else {
            // 0001 and 0000 patterns are post-base references into the
            // dynamic table.
            return Err(Error::wire("qpack: post-base field line"));
        }
    }
    Ok(())
}

/// String literal whose H flag sits directly above its N-bit length
/// prefix, which holds for every QPACK string position.
fn decode_string(data: &[u8], prefix_bits: u8) -> Result<(Vec<u8>, usize)> {
    let huffman_bit = 1u8 << prefix_bits;
    let huffman_coded = data
        .first()
        .map(|b| b & huffman_bit != 0)
        .ok_or_else(|| Error::wire("qpack: truncated string literal"))?;
    let (len, consumed) = prefix_int::decode(data, prefix_bits)?;
    let end = consumed
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| Error::wire("qpack: truncated string literal"))?;
    let raw = &data[consumed..end];
    let bytes = if huffman_coded {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    Ok((bytes, end))
}
