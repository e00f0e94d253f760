//! Variable-length integer encoding.
//!
//! Both signed and unsigned values are written as little-endian groups of
//! 7 bits with the continuation flag in the high bit of each byte. Signed
//! values are not zig-zag mapped: the sign travels through the arithmetic
//! shift, and encoding stops once the remaining value is pure sign
//! extension of the last group's bit 6.
//!
//! | value range (signed)          | bytes |
//! |-------------------------------|-------|
//! | `[-64, 63]`                   | 1     |
//! | `[-8192, 8191]`               | 2     |
//! | `i64::MIN`, `i64::MAX`        | 10    |

use crate::error::{Result, SeriesError};

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Shift of the tenth (last) group, which may only carry bit 63.
const LAST_GROUP_SHIFT: u32 = 63;

/// Writes `value` at `buf[pos..]` and returns the position after it.
///
/// The caller guarantees [`MAX_VARINT_LEN`] bytes of room.
pub fn encode_unsigned(buf: &mut [u8], mut pos: usize, mut value: u64) -> usize {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf[pos] = byte;
            return pos + 1;
        }
        buf[pos] = byte | 0x80;
        pos += 1;
    }
}

/// Writes `value` at `buf[pos..]` and returns the position after it.
///
/// The caller guarantees [`MAX_VARINT_LEN`] bytes of room.
pub fn encode_signed(buf: &mut [u8], mut pos: usize, mut value: i64) -> usize {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let sign_bit = byte & 0x40 != 0;
        if (value == 0 && !sign_bit) || (value == -1 && sign_bit) {
            buf[pos] = byte;
            return pos + 1;
        }
        buf[pos] = byte | 0x80;
        pos += 1;
    }
}

/// Returns the number of bytes [`encode_unsigned`] produces for `value`.
pub fn unsigned_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Decodes an unsigned varint at `*pos`, advancing `*pos` past it.
///
/// # Errors
///
/// Returns `SeriesError::Overflow` when the tenth byte carries more than the
/// single remaining bit, and `SeriesError::Serializer` when the buffer ends
/// inside the varint.
pub fn decode_unsigned(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = next_byte(buf, pos)?;
        if shift == LAST_GROUP_SHIFT {
            if byte > 1 {
                return Err(SeriesError::Overflow(format!(
                    "unsigned varint exceeds 64 bits (last byte {byte:#04x})"
                )));
            }
            return Ok(result | (u64::from(byte) << LAST_GROUP_SHIFT));
        }
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Decodes a signed varint at `*pos`, advancing `*pos` past it.
///
/// # Errors
///
/// Returns `SeriesError::Overflow` when the tenth byte is anything other
/// than pure sign extension, and `SeriesError::Serializer` when the buffer
/// ends inside the varint.
pub fn decode_signed(buf: &[u8], pos: &mut usize) -> Result<i64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = next_byte(buf, pos)?;
        if shift == LAST_GROUP_SHIFT {
            // 0x00 and 0x7f are the only valid sign extensions of bit 63.
            if byte != 0x00 && byte != 0x7f {
                return Err(SeriesError::Overflow(format!(
                    "signed varint exceeds 64 bits (last byte {byte:#04x})"
                )));
            }
            return Ok((result | (u64::from(byte & 1) << LAST_GROUP_SHIFT)) as i64);
        }
        result |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if byte & 0x40 != 0 {
                result |= !0u64 << shift;
            }
            return Ok(result as i64);
        }
    }
}

fn next_byte(buf: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *buf.get(*pos).ok_or_else(|| {
        SeriesError::Serializer(format!("unexpected end of data at byte {}", *pos))
    })?;
    *pos += 1;
    Ok(byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_signed(value: i64) -> (i64, usize) {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_signed(&mut buf, 0, value);
        let mut pos = 0;
        let decoded = decode_signed(&buf, &mut pos).unwrap();
        assert_eq!(pos, len);
        (decoded, len)
    }

    fn roundtrip_unsigned(value: u64) -> (u64, usize) {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_unsigned(&mut buf, 0, value);
        let mut pos = 0;
        let decoded = decode_unsigned(&buf, &mut pos).unwrap();
        assert_eq!(pos, len);
        (decoded, len)
    }

    #[test]
    fn test_signed_lengths() {
        assert_eq!(roundtrip_signed(0), (0, 1));
        assert_eq!(roundtrip_signed(63), (63, 1));
        assert_eq!(roundtrip_signed(64), (64, 2));
        assert_eq!(roundtrip_signed(-64), (-64, 1));
        assert_eq!(roundtrip_signed(-65), (-65, 2));
        assert_eq!(roundtrip_signed(i64::MAX), (i64::MAX, 10));
        assert_eq!(roundtrip_signed(i64::MIN), (i64::MIN, 10));
    }

    #[test]
    fn test_unsigned_lengths() {
        assert_eq!(roundtrip_unsigned(0), (0, 1));
        assert_eq!(roundtrip_unsigned(127), (127, 1));
        assert_eq!(roundtrip_unsigned(128), (128, 2));
        assert_eq!(roundtrip_unsigned(u64::MAX), (u64::MAX, 10));
    }

    #[test]
    fn test_unsigned_len_matches_encoder() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for value in [0u64, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            assert_eq!(unsigned_len(value), encode_unsigned(&mut buf, 0, value));
        }
    }

    #[test]
    fn test_minus_one_is_single_byte() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        assert_eq!(encode_signed(&mut buf, 0, -1), 1);
        assert_eq!(buf[0], 0x7f);
    }

    #[test]
    fn test_unsigned_overflow_rejected() {
        let mut buf = [0xffu8; MAX_VARINT_LEN];
        buf[9] = 0x02;
        let mut pos = 0;
        assert!(matches!(
            decode_unsigned(&buf, &mut pos),
            Err(SeriesError::Overflow(_))
        ));
    }

    #[test]
    fn test_signed_overflow_rejected() {
        let buf = [0xffu8; 11];
        let mut pos = 0;
        assert!(matches!(
            decode_signed(&buf, &mut pos),
            Err(SeriesError::Overflow(_))
        ));
    }

    #[test]
    fn test_truncated_input() {
        let buf = [0x80u8, 0x80];
        let mut pos = 0;
        assert!(matches!(
            decode_unsigned(&buf, &mut pos),
            Err(SeriesError::Serializer(_))
        ));
    }
}
