//! Script numbers.
//!
//! Arithmetic operands are arbitrary-precision signed integers serialized
//! little-endian in sign-magnitude form: the sign lives in the high bit of
//! the most significant (last) byte, with an extra byte appended when the
//! magnitude already uses that bit. Zero encodes as the empty sequence.

use crate::error::{ScriptError, ScriptResult};
use num_bigint::{BigInt, Sign};

/// Longest operand the interpreter accepts as a number.
pub(crate) const MAX_NUM_SIZE: usize = 4;

/// Serialize a script number.
pub fn encode_num(value: &BigInt) -> Vec<u8> {
    let (sign, magnitude_be) = value.to_bytes_be();
    if sign == Sign::NoSign {
        return Vec::new();
    }
    let mut bytes: Vec<u8> = magnitude_be.into_iter().rev().collect();
    let high_bit_used = bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false);
    if high_bit_used {
        bytes.push(if sign == Sign::Minus { 0x80 } else { 0x00 });
    } else if sign == Sign::Minus {
        let last = bytes.len() - 1;
        bytes[last] |= 0x80;
    }
    bytes
}

/// Parse a script number of any length.
pub fn decode_num(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::from(0);
    }
    let mut magnitude: Vec<u8> = bytes.to_vec();
    let last = magnitude.len() - 1;
    let negative = magnitude[last] & 0x80 != 0;
    magnitude[last] &= 0x7F;
    magnitude.reverse();
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    BigInt::from_bytes_be(sign, &magnitude)
}

/// Parse a numeric stack operand, enforcing the 4-byte operand limit.
pub(crate) fn decode_num_checked(bytes: &[u8]) -> ScriptResult<BigInt> {
    if bytes.len() > MAX_NUM_SIZE {
        return Err(ScriptError::NumberTooLarge);
    }
    Ok(decode_num(bytes))
}

/// Interpret a stack element as a boolean.
///
/// False iff every byte is zero, or the only non-zero byte is a trailing
/// `0x80` ("negative zero").
pub fn cast_to_bool(data: &[u8]) -> bool {
    for (i, &byte) in data.iter().enumerate() {
        if byte != 0 {
            return !(i == data.len() - 1 && byte == 0x80);
        }
    }
    false
}
