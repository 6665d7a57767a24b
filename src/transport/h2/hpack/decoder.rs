//! HPACK decoder (RFC 7541).

use super::dynamic_table::DynamicTable;
use super::static_table;
use crate::error::{Error, Result};
use crate::transport::{huffman, prefix_int};

const STATIC_TABLE_LEN: usize = static_table::STATIC_TABLE.len();

/// Header-block decoder with its connection-scoped dynamic table.
pub struct Decoder {
    table: DynamicTable,
}

impl Decoder {
    /// Dynamic table sized per our SETTINGS (4096 octets).
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(4096),
        }
    }

    /// Decode a complete header block, emitting each field in order.
    pub fn decode<F>(&mut self, mut data: &[u8], mut emit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]),
    {
        while let Some(&first) = data.first() {
            if first & 0x80 != 0 {
                // Indexed field (Section 6.1).
                let (index, n) = prefix_int::decode(data, 7)?;
                data = &data[n..];
                let (name, value) = self.lookup(index)?;
                emit(&name, &value);
            } else if first & 0xc0 == 0x40 {
                // Literal with incremental indexing (Section 6.2.1).
                let (name_index, n) = prefix_int::decode(data, 6)?;
                data = &data[n..];
                let name = if name_index == 0 {
                    let (name, n) = decode_string(data)?;
                    data = &data[n..];
                    name
                } else {
                    self.lookup(name_index)?.0
                };
                let (value, n) = decode_string(data)?;
                data = &data[n..];
                emit(&name, &value);
                self.table.add(name, value);
            } else if first & 0xe0 == 0x20 {
                // Dynamic table size update (Section 6.3).
                let (size, n) = prefix_int::decode(data, 5)?;
                data = &data[n..];
                self.table.set_max_size(size);
            } else {
                // Literal without indexing / never indexed (Sections
                // 6.2.2 and 6.2.3) share the 4-bit-prefix layout.
                let (name_index, n) = prefix_int::decode(data, 4)?;
                data = &data[n..];
                let name = if name_index == 0 {
                    let (name, n) = decode_string(data)?;
                    data = &data[n..];
                    name
                } else {
                    self.lookup(name_index)?.0
                };
                let (value, n) = decode_string(data)?;
                data = &data[n..];
                emit(&name, &value);
            }
        }
        Ok(())
    }

    /// Resolve a combined static+dynamic index into owned bytes.
    fn lookup(&self, index: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        let entry = if index <= STATIC_TABLE_LEN {
            static_table::get(index)
        } else {
            self.table.get(index - STATIC_TABLE_LEN)
        };
        entry
            .map(|(n, v)| (n.to_vec(), v.to_vec()))
            .ok_or_else(|| Error::wire(format!("hpack: invalid index {index}")))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// String literal (Section 5.2): H flag, 7-bit-prefix length, bytes.
fn decode_string(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let huffman_coded = data
        .first()
        .map(|b| b & 0x80 != 0)
        .ok_or_else(|| Error::wire("hpack: truncated string literal"))?;
    let (len, consumed) = prefix_int::decode(data, 7)?;
    let end = consumed
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| Error::wire("hpack: truncated string literal"))?;
    let raw = &data[consumed..end];
    let bytes = if huffman_coded {
        huffman::decode(raw)?
    } else {
        raw.to_vec()
    };
    Ok((bytes, end))
}
