use crate::storage::trie::error::{Result, TrieError};

/// Nibble is a 4-bit value (0-15)
pub type Nibble = u8;

/// HP flag marking a leaf's terminal suffix
const HP_LEAF_FLAG: u8 = 0x20;
/// HP flag marking an odd number of nibbles
const HP_ODD_FLAG: u8 = 0x10;

/// Split a byte slice into nibbles
///
/// Each byte becomes two nibbles, high nibble first.
/// For example, the byte 0xAB becomes [0xA, 0xB].
pub fn bytes_to_nibbles(bytes: &[u8]) -> Vec<Nibble> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);

    for &byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0F);
    }

    nibbles
}

/// Decode a hex scan prefix into bytes
///
/// An odd number of digits is padded with a leading `0`, which prefix
/// scans drop again, so `"a"` selects everything under the nibble `a`.
pub fn hex_prefix_to_bytes(hex: &str) -> Result<Vec<u8>> {
    let padded = if hex.len() % 2 == 1 { format!("0{}", hex) } else { hex.to_string() };
    hex::decode(&padded).map_err(|e| TrieError::Decode(format!("Invalid hex prefix {}: {}", hex, e)))
}

/// Pack nibbles back into bytes
///
/// Every two nibbles become one byte. An odd trailing nibble is placed
/// in the high half of a final byte, so [0x1, 0x2, 0x3] becomes [0x12, 0x30].
pub fn nibbles_to_bytes(nibbles: &[Nibble]) -> Vec<u8> {
    nibbles
        .chunks(2)
        .map(|chunk| match chunk {
            [high, low] => (high << 4) | low,
            [high] => high << 4,
            _ => 0,
        })
        .collect()
}

/// Render nibbles as a lowercase hex string
pub fn nibbles_to_hex(nibbles: &[Nibble]) -> String {
    nibbles
        .iter()
        .map(|&n| std::char::from_digit(u32::from(n & 0x0F), 16).unwrap_or('0'))
        .collect()
}

/// Length of the shared prefix of two nibble sequences
pub fn common_prefix_len(a: &[Nibble], b: &[Nibble]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Hex-Prefix encoding for the paths of leaf and extension nodes
///
/// The high nibble of the first byte holds the flags:
/// - 0x20 marks a leaf suffix
/// - 0x10 marks an odd number of nibbles
///
/// An odd path stores its first nibble in the low half of the first byte.
/// For example:
/// - [0, 1, 2, 3, 4, 5] as an extension becomes [0x00, 0x01, 0x23, 0x45]
/// - [0, 1, 2, 3, 4, 5] as a leaf becomes [0x20, 0x01, 0x23, 0x45]
/// - [1, 2, 3, 4, 5] as an extension becomes [0x11, 0x23, 0x45]
/// - [1, 2, 3, 4, 5] as a leaf becomes [0x31, 0x23, 0x45]
pub fn compact_encode(nibbles: &[Nibble], is_leaf: bool) -> Vec<u8> {
    let mut compact = Vec::with_capacity(nibbles.len() / 2 + 1);
    let flags = if is_leaf { HP_LEAF_FLAG } else { 0 };

    let rest = if nibbles.len() % 2 == 1 {
        compact.push(flags | HP_ODD_FLAG | nibbles[0]);
        &nibbles[1..]
    } else {
        compact.push(flags);
        nibbles
    };

    compact.extend(rest.chunks(2).map(|pair| (pair[0] << 4) | pair[1]));
    compact
}

/// Decode a Hex-Prefix encoding back to nibbles and the leaf flag
///
/// Fails on empty input and on flag bits outside the leaf/odd pair.
/// Even encodings must carry a zero low nibble in the first byte.
pub fn compact_decode(compact: &[u8]) -> Result<(Vec<Nibble>, bool)> {
    let first_byte = *compact
        .first()
        .ok_or_else(|| TrieError::Decode("empty HP encoding".to_string()))?;

    let flags = first_byte >> 4;
    if flags > 0x3 {
        return Err(TrieError::Decode(format!("invalid HP flags: {:#04x}", first_byte)));
    }

    let is_leaf = first_byte & HP_LEAF_FLAG != 0;
    let is_odd = first_byte & HP_ODD_FLAG != 0;

    let mut nibbles = Vec::with_capacity(compact.len() * 2);
    if is_odd {
        nibbles.push(first_byte & 0x0F);
    } else if first_byte & 0x0F != 0 {
        return Err(TrieError::Decode(format!("non-zero padding in even HP encoding: {:#04x}", first_byte)));
    }
    nibbles.extend(bytes_to_nibbles(&compact[1..]));

    Ok((nibbles, is_leaf))
}

/// Helper function to format a slice of nibbles for logs
pub fn format_nibbles(nibbles: &[Nibble]) -> String {
    if nibbles.is_empty() {
        return "[]".to_string();
    }
    format!("[{}]", nibbles_to_hex(nibbles))
}
