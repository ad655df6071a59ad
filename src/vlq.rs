//! Base64 variable-length quantities.
//!
//! Source maps store every number as a self-terminating run of base64
//! symbols. Each symbol carries five payload bits plus a continuation bit;
//! the lowest bit of the first group holds the sign.

use smallvec::SmallVec;
use thiserror::Error;

const BASE64_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_SHIFT: u32 = 5;
const VLQ_MASK: u64 = 0b1_1111;
const VLQ_CONTINUATION: u64 = 0b10_0000;

/// Largest shift a 32-bit value plus its sign bit can need.
const MAX_SHIFT: u32 = 30;

/// Errors from encoding or decoding VLQ values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VlqError {
    #[error("value {0} does not fit in a 32-bit signed VLQ")]
    OutOfRange(i64),

    #[error("invalid base64 VLQ symbol at offset {0}")]
    InvalidSymbol(usize),

    #[error("VLQ ends in the middle of a value")]
    Unterminated,

    #[error("VLQ value overflows 32 bits")]
    Overflow,

    #[error("unexpected trailing data after VLQ value at offset {0}")]
    TrailingData(usize),
}

/// Encode a single value.
///
/// # Examples
///
/// ```
/// use catmap::vlq::encode;
///
/// assert_eq!(encode(0).unwrap(), "A");
/// assert_eq!(encode(-1).unwrap(), "D");
/// assert_eq!(encode(16).unwrap(), "gB");
/// ```
pub fn encode(value: i64) -> Result<String, VlqError> {
    let mut out = String::with_capacity(7);
    encode_into(value, &mut out)?;
    Ok(out)
}

/// Encode a single value, appending the symbols to `out`.
///
/// Nothing is appended when the value is out of range.
pub fn encode_into(value: i64, out: &mut String) -> Result<(), VlqError> {
    if value < i64::from(i32::MIN) || value > i64::from(i32::MAX) {
        return Err(VlqError::OutOfRange(value));
    }

    let mut vlq = if value < 0 {
        (value.unsigned_abs() << 1) | 1
    } else {
        (value as u64) << 1
    };

    loop {
        let mut digit = vlq & VLQ_MASK;
        vlq >>= VLQ_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION;
        }
        out.push(BASE64_ALPHABET[digit as usize] as char);
        if vlq == 0 {
            return Ok(());
        }
    }
}

/// Decode exactly one value; the whole input must be consumed.
pub fn decode(input: &str) -> Result<i64, VlqError> {
    let bytes = input.as_bytes();
    let mut pos = 0;
    let value = decode_value(bytes, &mut pos)?;
    if pos != bytes.len() {
        return Err(VlqError::TrailingData(pos));
    }
    Ok(value)
}

/// Decode every value in one mapping segment (the text between commas).
pub fn decode_segment(segment: &str) -> Result<SmallVec<[i64; 5]>, VlqError> {
    let bytes = segment.as_bytes();
    let mut pos = 0;
    let mut values = SmallVec::new();
    while pos < bytes.len() {
        values.push(decode_value(bytes, &mut pos)?);
    }
    Ok(values)
}

fn decode_value(bytes: &[u8], pos: &mut usize) -> Result<i64, VlqError> {
    let mut accum: u64 = 0;
    let mut shift = 0;

    loop {
        let byte = *bytes.get(*pos).ok_or(VlqError::Unterminated)?;
        let digit = symbol_value(byte).ok_or(VlqError::InvalidSymbol(*pos))?;
        *pos += 1;

        if shift > MAX_SHIFT {
            return Err(VlqError::Overflow);
        }
        accum |= (digit & VLQ_MASK) << shift;

        if digit & VLQ_CONTINUATION == 0 {
            break;
        }
        shift += VLQ_SHIFT;
    }

    let magnitude = (accum >> 1) as i64;
    let value = if accum & 1 == 1 { -magnitude } else { magnitude };
    if value < i64::from(i32::MIN) || value > i64::from(i32::MAX) {
        return Err(VlqError::Overflow);
    }
    Ok(value)
}

fn symbol_value(byte: u8) -> Option<u64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(u64::from(value))
}
