//! Wire encoding primitives.
//!
//! All multi-byte integers are little-endian. Variable-length integers use
//! the compact encoding: one byte below `0xFD`, otherwise a `0xFD`/`0xFE`/
//! `0xFF` marker followed by a u16/u32/u64.

use crate::error::{EncodeError, EncodeResult};
use crate::hash::Sha256dHash;
use bytes::{Buf, BufMut, Bytes};

fn need(buf: &Bytes, n: usize) -> EncodeResult<()> {
    if buf.remaining() < n {
        return Err(EncodeError::UnexpectedEnd {
            need: n,
            have: buf.remaining(),
        });
    }
    Ok(())
}

/// Read a single byte.
pub fn read_u8(buf: &mut Bytes) -> EncodeResult<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a little-endian u16.
pub fn read_u16(buf: &mut Bytes) -> EncodeResult<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16_le())
}

/// Read a little-endian u32.
pub fn read_u32(buf: &mut Bytes) -> EncodeResult<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32_le())
}

/// Read a little-endian u64.
pub fn read_u64(buf: &mut Bytes) -> EncodeResult<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64_le())
}

/// Read a compact variable-length integer.
pub fn read_varint(buf: &mut Bytes) -> EncodeResult<u64> {
    let first = read_u8(buf)?;
    match first {
        0xFD => Ok(read_u16(buf)? as u64),
        0xFE => Ok(read_u32(buf)? as u64),
        0xFF => read_u64(buf),
        n => Ok(n as u64),
    }
}

/// Read exactly `n` raw bytes.
pub fn read_bytes(buf: &mut Bytes, n: usize) -> EncodeResult<Bytes> {
    need(buf, n)?;
    Ok(buf.copy_to_bytes(n))
}

/// Read a varint length followed by that many raw bytes.
pub fn read_varbytes(buf: &mut Bytes) -> EncodeResult<Vec<u8>> {
    let len = read_varint(buf)? as usize;
    Ok(read_bytes(buf, len)?.to_vec())
}

/// Read a varint length followed by a UTF-8 string.
pub fn read_varstr(buf: &mut Bytes) -> EncodeResult<String> {
    let bytes = read_varbytes(buf)?;
    String::from_utf8(bytes).map_err(|e| EncodeError::Invalid(format!("bad UTF-8 string: {e}")))
}

/// Read a 32-byte hash.
pub fn read_hash(buf: &mut Bytes) -> EncodeResult<Sha256dHash> {
    let bytes = read_bytes(buf, 32)?;
    Sha256dHash::from_slice(&bytes)
}

/// Write a compact variable-length integer.
pub fn write_varint(buf: &mut impl BufMut, value: u64) {
    match value {
        0..=0xFC => buf.put_u8(value as u8),
        0xFD..=0xFFFF => {
            buf.put_u8(0xFD);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.put_u8(0xFE);
            buf.put_u32_le(value as u32);
        }
        _ => {
            buf.put_u8(0xFF);
            buf.put_u64_le(value);
        }
    }
}

/// Write a varint length followed by raw bytes.
pub fn write_varbytes(buf: &mut impl BufMut, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.put_slice(bytes);
}

/// Write a varint length followed by UTF-8 bytes.
pub fn write_varstr(buf: &mut impl BufMut, s: &str) {
    write_varbytes(buf, s.as_bytes());
}

/// Write a 32-byte hash.
pub fn write_hash(buf: &mut impl BufMut, hash: &Sha256dHash) {
    buf.put_slice(hash.as_bytes());
}

/// Number of bytes `write_varint` produces for `value`.
pub fn varint_len(value: u64) -> usize {
    match value {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}
