//! Bit and byte addressing over hex-encoded payloads
//!
//! Bit numbering follows the wire order of the hex string: bit 0 is the most
//! significant bit of the first byte, bit 7 its least significant bit, bit 8
//! the most significant bit of the second byte, and so on.
//!
//! Every read is range checked. A read that would run past the end of the
//! payload is an [`CodecError::OutOfRange`], never a silently truncated value.

use crate::types::{CodecError, Result};

/// Immutable payload decoded from a hex string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadBuffer {
    bytes: Vec<u8>,
    /// Normalized lowercase hex, kept for hex-character addressing
    hex: String,
}

impl PayloadBuffer {
    /// Parse a hex string (either case) into a payload buffer
    ///
    /// Fails with `MalformedPayload` on odd length or non-hex characters,
    /// whitespace included.
    pub fn from_hex(payload_hex: &str) -> Result<Self> {
        let bytes = hex::decode(payload_hex).map_err(|e| {
            CodecError::MalformedPayload(format!("invalid hex payload {:?}: {}", payload_hex, e))
        })?;

        Ok(Self {
            hex: hex::encode(&bytes),
            bytes,
        })
    }

    /// Wrap raw bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self {
            hex: hex::encode(&bytes),
            bytes,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Lowercase hex representation
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Length in bits
    pub fn bit_len(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Fail unless the payload holds at least `min_bytes` bytes
    pub fn require_len(&self, min_bytes: usize) -> Result<()> {
        if self.bytes.len() < min_bytes {
            return Err(CodecError::PayloadTooShort {
                expected: min_bytes,
                actual: self.bytes.len(),
            });
        }
        Ok(())
    }

    /// Read `length` bits starting at bit `offset` as an unsigned integer
    ///
    /// The first addressed bit becomes the most significant bit of the result.
    /// `length` must be between 1 and 64.
    pub fn bits(&self, offset: usize, length: usize) -> Result<u64> {
        self.check_range(offset, length)?;

        let mut result: u64 = 0;
        for i in 0..length {
            let bit_pos = offset + i;
            let byte_idx = bit_pos / 8;
            let bit_in_byte = 7 - (bit_pos % 8);

            let bit_value = (self.bytes[byte_idx] >> bit_in_byte) & 0x01;
            result |= (bit_value as u64) << (length - 1 - i);
        }

        log::trace!("bits({}, {}) = {:#x}", offset, length, result);
        Ok(result)
    }

    /// Same as [`bits`](Self::bits), tagging range errors with a field name
    pub fn named_bits(&self, field: &str, offset: usize, length: usize) -> Result<u64> {
        self.bits(offset, length).map_err(|e| e.with_field(field))
    }

    /// Read `length` bits with the first addressed bit as the least significant
    ///
    /// Some devices pack small counters with reversed bit significance inside
    /// a byte.
    pub fn bits_lsb_first(&self, offset: usize, length: usize) -> Result<u64> {
        self.check_range(offset, length)?;

        let mut result: u64 = 0;
        for i in 0..length {
            let bit_pos = offset + i;
            let bit_value = (self.bytes[bit_pos / 8] >> (7 - (bit_pos % 8))) & 0x01;
            result |= (bit_value as u64) << i;
        }
        Ok(result)
    }

    /// Single bit as a flag
    pub fn flag(&self, field: &str, offset: usize) -> Result<bool> {
        Ok(self.named_bits(field, offset, 1)? == 1)
    }

    /// Single byte at a byte index
    pub fn byte(&self, index: usize) -> Result<u8> {
        let offset = index
            .checked_mul(8)
            .ok_or_else(|| self.out_of_range(index.saturating_mul(8), 8))?;
        Ok(self.bits(offset, 8)? as u8)
    }

    /// Byte slice `[start, start + len)`
    pub fn slice(&self, start: usize, len: usize) -> Result<&[u8]> {
        if len == 0 {
            return Err(CodecError::InvalidFieldSpec("zero-length slice".to_string()));
        }
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(&self.bytes[start..end]),
            _ => Err(self.out_of_range(start.saturating_mul(8), len.saturating_mul(8))),
        }
    }

    /// Hex substring addressed in hex characters (2 characters = 1 byte)
    pub fn byte_range(&self, char_offset: usize, char_length: usize) -> Result<&str> {
        match char_offset.checked_add(char_length) {
            Some(end) if end <= self.hex.len() => Ok(&self.hex[char_offset..end]),
            _ => Err(self.out_of_range(
                char_offset.saturating_mul(4),
                char_length.saturating_mul(4),
            )),
        }
    }

    fn out_of_range(&self, offset: usize, length: usize) -> CodecError {
        CodecError::OutOfRange {
            field: None,
            offset,
            length,
            available: self.bit_len(),
        }
    }

    fn check_range(&self, offset: usize, length: usize) -> Result<()> {
        if length == 0 || length > 64 {
            return Err(CodecError::InvalidFieldSpec(format!(
                "bit length {} outside 1..=64",
                length
            )));
        }

        match offset.checked_add(length) {
            Some(end) if end <= self.bit_len() => Ok(()),
            _ => Err(self.out_of_range(offset, length)),
        }
    }
}

/// Sign-extend a value from N bits to 64 bits
///
/// If the value's most significant bit is 1, the upper bits are filled with 1s.
pub fn sign_extend(value: u64, bit_length: usize) -> i64 {
    if bit_length == 0 || bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_accepts_both_cases() {
        let upper = PayloadBuffer::from_hex("ABCDEF12").unwrap();
        let lower = PayloadBuffer::from_hex("abcdef12").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_hex(), "abcdef12");
        assert_eq!(upper.bit_len(), 32);
    }

    #[test]
    fn test_from_hex_rejects_odd_length() {
        let err = PayloadBuffer::from_hex("abc").unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn test_from_hex_rejects_non_hex() {
        let err = PayloadBuffer::from_hex("zz00").unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn test_bits_byte_aligned() {
        let buf = PayloadBuffer::from_hex("abcdef12").unwrap();
        assert_eq!(buf.bits(0, 8).unwrap(), 0xAB);
        assert_eq!(buf.bits(8, 16).unwrap(), 0xCDEF);
        assert_eq!(buf.bits(0, 32).unwrap(), 0xABCDEF12);
    }

    #[test]
    fn test_bits_cross_byte() {
        // 0xAB = 1010_1011, 0xCD = 1100_1101
        let buf = PayloadBuffer::from_hex("abcd").unwrap();
        assert_eq!(buf.bits(0, 2).unwrap(), 0b10);
        assert_eq!(buf.bits(4, 8).unwrap(), 0xBC);
        assert_eq!(buf.bits(7, 2).unwrap(), 0b11);
    }

    #[test]
    fn test_bits_lsb_first() {
        // 0b1100_0000: first bit read is the lowest bit of the result
        let buf = PayloadBuffer::from_hex("c0").unwrap();
        assert_eq!(buf.bits(0, 3).unwrap(), 0b110);
        assert_eq!(buf.bits_lsb_first(0, 3).unwrap(), 0b011);
    }

    #[test]
    fn test_bits_out_of_range() {
        let buf = PayloadBuffer::from_hex("abcd").unwrap();
        let err = buf.bits(10, 8).unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: None,
                offset: 10,
                length: 8,
                available: 16
            }
        );
    }

    #[test]
    fn test_named_bits_reports_field() {
        let buf = PayloadBuffer::from_hex("ab").unwrap();
        match buf.named_bits("volume", 0, 16).unwrap_err() {
            CodecError::OutOfRange { field, .. } => assert_eq!(field.as_deref(), Some("volume")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_zero_length_read_is_rejected() {
        let buf = PayloadBuffer::from_hex("ab").unwrap();
        assert!(matches!(
            buf.bits(0, 0).unwrap_err(),
            CodecError::InvalidFieldSpec(_)
        ));
    }

    #[test]
    fn test_byte_range() {
        let buf = PayloadBuffer::from_hex("0102030405").unwrap();
        assert_eq!(buf.byte_range(2, 4).unwrap(), "0203");
        assert!(buf.byte_range(8, 4).is_err());
    }

    #[test]
    fn test_from_hex_rejects_whitespace() {
        for input in [" 0102", "0102\n", " 0102\n", "01 02"] {
            let err = PayloadBuffer::from_hex(input).unwrap_err();
            assert!(matches!(err, CodecError::MalformedPayload(_)), "{:?}", input);
        }
    }

    #[test]
    fn test_huge_offsets_are_range_errors() {
        let buf = PayloadBuffer::from_hex("0102").unwrap();
        let out_of_range = |r: Result<()>| matches!(r, Err(CodecError::OutOfRange { .. }));

        assert!(out_of_range(buf.byte_range(usize::MAX, 2).map(|_| ())));
        assert!(out_of_range(buf.byte_range(2, usize::MAX).map(|_| ())));
        assert!(out_of_range(buf.byte(usize::MAX).map(|_| ())));
        assert!(out_of_range(buf.byte(usize::MAX / 8 + 1).map(|_| ())));
        assert!(out_of_range(buf.slice(usize::MAX, 1).map(|_| ())));
        assert!(out_of_range(buf.slice(1, usize::MAX).map(|_| ())));
        assert!(out_of_range(buf.bits(usize::MAX, 8).map(|_| ())));
    }

    #[test]
    fn test_slice() {
        let buf = PayloadBuffer::from_hex("010203").unwrap();
        assert_eq!(buf.slice(1, 2).unwrap(), &[0x02, 0x03]);
        assert!(buf.slice(2, 2).is_err());
    }

    #[test]
    fn test_require_len() {
        let buf = PayloadBuffer::from_hex("0102").unwrap();
        assert!(buf.require_len(2).is_ok());
        assert_eq!(
            buf.require_len(3).unwrap_err(),
            CodecError::PayloadTooShort {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }
}
