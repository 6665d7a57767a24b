//! HPACK encoder (RFC 7541).

use super::dynamic_table::DynamicTable;
use super::static_table;
use crate::transport::{huffman, prefix_int};

const STATIC_TABLE_LEN: usize = static_table::STATIC_TABLE.len();

/// Header-block encoder. One instance lives for one connection, since
/// the dynamic table is connection state.
pub struct Encoder {
    table: DynamicTable,
}

impl Encoder {
    /// Default dynamic table size per RFC 7541 (4096 octets).
    pub fn new() -> Self {
        Self {
            table: DynamicTable::new(4096),
        }
    }

    /// Append one field to the header block.
    ///
    /// Picks the cheapest representation: fully indexed if the field is
    /// in either table, name-indexed literal if only the name is, plain
    /// literal otherwise. Literals enter the dynamic table.
    pub fn encode_field(&mut self, name: &[u8], value: &[u8], out: &mut Vec<u8>) {
        // Indexed field (Section 6.1): 1xxxxxxx
        if let Some(index) = static_table::find(name, value) {
            prefix_int::encode(0x80, 7, index, out);
            return;
        }
        if let Some(index) = self.table.find(name, value) {
            prefix_int::encode(0x80, 7, STATIC_TABLE_LEN + index, out);
            return;
        }

        // Literal with incremental indexing (Section 6.2.1): 01xxxxxx
        let name_index = static_table::find_name(name)
            .or_else(|| self.table.find_name(name).map(|i| STATIC_TABLE_LEN + i));
        match name_index {
            Some(index) => prefix_int::encode(0x40, 6, index, out),
            None => {
                prefix_int::encode(0x40, 6, 0, out);
                encode_string(name, out);
            }
        }
        encode_string(value, out);
        self.table.add(name.to_vec(), value.to_vec());
    }

    /// Encode a whole field list into a fresh block.
    pub fn encode(&mut self, fields: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
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

/// String literal (Section 5.2): Huffman only when it helps.
fn encode_string(s: &[u8], out: &mut Vec<u8>) {
    let (bytes, huffman) = huffman::encode_if_smaller(s);
    prefix_int::encode(if huffman { 0x80 } else { 0x00 }, 7, bytes.len(), out);
    out.extend_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_match_is_single_indexed_field() {
        let mut enc = Encoder::new();
        let block = enc.encode(&[(b":method", b"GET")]);
        assert_eq!(block, [0x82]);
    }

    #[test]
    fn repeated_literal_hits_dynamic_table() {
        let mut enc = Encoder::new();
        let first = enc.encode(&[(b"x-trace-id", b"abc123")]);
        assert_eq!(first[0] & 0xc0, 0x40);

        // Second occurrence must be a one-field indexed reference into
        // the dynamic table (index 62 = first dynamic slot).
        let second = enc.encode(&[(b"x-trace-id", b"abc123")]);
        assert_eq!(second, [0x80 | 62]);
    }

    #[test]
    fn name_only_match_uses_name_reference() {
        let mut enc = Encoder::new();
        let block = enc.encode(&[(b"user-agent", b"wraith")]);
        // 01 prefix with the static index for user-agent (58).
        assert_eq!(block[0], 0x40 | 58);
    }
}
