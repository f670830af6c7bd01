//! Little-endian hex group conversion
//!
//! Meter payloads carry multi-byte identifiers and counters least significant
//! byte first. These helpers reverse such hex groups and parse them.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::types::{CodecError, Result};

/// Widest group the converter accepts, in bytes
pub const MAX_GROUP_BYTES: usize = 8;

/// Decode a little-endian hex group into bytes, validating its shape
fn group_bytes(hex_group: &str) -> Result<Vec<u8>> {
    if hex_group.is_empty() {
        return Err(CodecError::MalformedPayload("empty hex group".to_string()));
    }

    let bytes = hex::decode(hex_group).map_err(|e| {
        CodecError::MalformedPayload(format!("invalid hex group '{}': {}", hex_group, e))
    })?;

    if bytes.len() > MAX_GROUP_BYTES {
        return Err(CodecError::Overflow(format!(
            "hex group '{}' is {} bytes, at most {} supported",
            hex_group,
            bytes.len(),
            MAX_GROUP_BYTES
        )));
    }

    Ok(bytes)
}

/// Reverse the byte order of a hex group ("1a2b3c" -> "3c2b1a")
pub fn reverse_bytes(hex_group: &str) -> Result<String> {
    if hex_group.len() % 2 != 0 {
        return Err(CodecError::MalformedPayload(format!(
            "hex group '{}' has odd length",
            hex_group
        )));
    }
    let mut bytes = hex::decode(hex_group).map_err(|e| {
        CodecError::MalformedPayload(format!("invalid hex group '{}': {}", hex_group, e))
    })?;
    bytes.reverse();
    Ok(hex::encode(bytes))
}

/// Parse a little-endian hex group as an unsigned integer
pub fn le_hex_to_u64(hex_group: &str) -> Result<u64> {
    let bytes = group_bytes(hex_group)?;
    let mut cursor = Cursor::new(&bytes);
    cursor
        .read_uint::<LittleEndian>(bytes.len())
        .map_err(|e| CodecError::MalformedPayload(format!("hex group '{}': {}", hex_group, e)))
}

/// Parse a little-endian hex group as a two's-complement signed integer
pub fn le_hex_to_i64(hex_group: &str) -> Result<i64> {
    let bytes = group_bytes(hex_group)?;
    let mut cursor = Cursor::new(&bytes);
    cursor
        .read_int::<LittleEndian>(bytes.len())
        .map_err(|e| CodecError::MalformedPayload(format!("hex group '{}': {}", hex_group, e)))
}

/// Reverse a little-endian hex group and parse it as an integer
///
/// With `signed` the group is read as two's complement of its own width.
/// Unsigned groups that do not fit an `i64` fail with `Overflow`.
pub fn to_big_endian_int(hex_group: &str, signed: bool) -> Result<i64> {
    if signed {
        return le_hex_to_i64(hex_group);
    }

    let value = le_hex_to_u64(hex_group)?;
    i64::try_from(value).map_err(|_| {
        CodecError::Overflow(format!(
            "unsigned value {} of group '{}' exceeds i64",
            value, hex_group
        ))
    })
}
