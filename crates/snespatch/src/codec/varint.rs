//! BPS variable-length integers
//!
//! Each byte carries seven data bits, least significant group first. The last
//! byte has its high bit set. Unlike plain base-128, every non-terminal byte
//! also contributes `shift` to the total, so each length has exactly one
//! encoding; the encoder compensates by subtracting one per continuation.

use crate::common::{PatchError, Result};

/// Append `value` to `out`
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte | 0x80);
            break;
        }
        out.push(byte);
        value -= 1;
    }
}

/// Append a signed relative offset as `(|delta| << 1) | sign`
pub fn write_signed_varint(out: &mut Vec<u8>, delta: i64) {
    let magnitude = delta.unsigned_abs();
    write_varint(out, (magnitude << 1) | u64::from(delta < 0));
}

/// Read one varint from the front of `input`, advancing it
pub fn read_varint(input: &mut &[u8]) -> Result<u64> {
    let mut data: u64 = 0;
    let mut shift: u64 = 1;

    loop {
        let Some((&byte, rest)) = input.split_first() else {
            return Err(PatchError::format("BPS", "unexpected end of data in varint"));
        };
        *input = rest;

        let group = u64::from(byte & 0x7F)
            .checked_mul(shift)
            .ok_or_else(|| PatchError::format("BPS", "varint overflows 64 bits"))?;
        data = data
            .checked_add(group)
            .ok_or_else(|| PatchError::format("BPS", "varint overflows 64 bits"))?;

        if byte & 0x80 != 0 {
            return Ok(data);
        }

        shift = shift
            .checked_mul(128)
            .ok_or_else(|| PatchError::format("BPS", "varint overflows 64 bits"))?;
        data = data
            .checked_add(shift)
            .ok_or_else(|| PatchError::format("BPS", "varint overflows 64 bits"))?;
    }
}

/// Read a signed relative offset written by [`write_signed_varint`]
pub fn read_signed_varint(input: &mut &[u8]) -> Result<i64> {
    let raw = read_varint(input)?;
    let magnitude = i64::try_from(raw >> 1)
        .map_err(|_| PatchError::format("BPS", "relative offset out of range"))?;
    Ok(if raw & 1 != 0 { -magnitude } else { magnitude })
}

/// Encode a single value into a fresh buffer
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    write_varint(&mut out, value);
    out
}

/// Decode a buffer holding exactly one varint
pub fn decode(bytes: &[u8]) -> Result<u64> {
    let mut input = bytes;
    let value = read_varint(&mut input)?;
    if !input.is_empty() {
        return Err(PatchError::format("BPS", "trailing bytes after varint"));
    }
    Ok(value)
}
