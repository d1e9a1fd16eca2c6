//! Aligned Packed Encoding Rules (X.691) fragments.
//!
//! The data-phase PDUs carry PER-encoded fields: lengths in one byte
//! below 0x80 or two bytes with the top bit set, constrained 16-bit
//! integers as big-endian offsets from their lower bound, and
//! single-byte enumerations.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Asn1Error, Result};

/// Largest length expressible in the two-byte form.
pub const MAX_LENGTH: usize = 0x7FFF;

fn need(src: &Bytes, needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(Asn1Error::Truncated {
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}

/// Write a PER length determinant.
pub fn write_length(dst: &mut BytesMut, len: usize) -> Result<()> {
    if len < 0x80 {
        dst.put_u8(len as u8);
    } else if len <= MAX_LENGTH {
        dst.put_u16(len as u16 | 0x8000);
    } else {
        return Err(Asn1Error::OutOfBounds {
            value: len as u64,
            min: 0,
            max: MAX_LENGTH as u64,
        });
    }
    Ok(())
}

/// Read a PER length determinant.
pub fn read_length(src: &mut Bytes) -> Result<usize> {
    need(src, 1)?;
    let first = src.get_u8();
    if first & 0x80 == 0 {
        return Ok(first as usize);
    }
    need(src, 1)?;
    Ok(((first as usize & 0x7F) << 8) | src.get_u8() as usize)
}

/// Write a constrained 16-bit integer as an offset from `min`.
pub fn write_u16(dst: &mut BytesMut, value: u16, min: u16) -> Result<()> {
    if value < min {
        return Err(Asn1Error::OutOfBounds {
            value: value as u64,
            min: min as u64,
            max: u16::MAX as u64,
        });
    }
    dst.put_u16(value - min);
    Ok(())
}

/// Read a constrained 16-bit integer, adding `min` back.
pub fn read_u16(src: &mut Bytes, min: u16) -> Result<u16> {
    need(src, 2)?;
    let offset = src.get_u16();
    min.checked_add(offset).ok_or(Asn1Error::OutOfBounds {
        value: min as u64 + offset as u64,
        min: min as u64,
        max: u16::MAX as u64,
    })
}

/// Write a variable-width unconstrained integer (1, 2, or 4 bytes).
pub fn write_integer(dst: &mut BytesMut, value: u32) -> Result<()> {
    if value <= u8::MAX as u32 {
        write_length(dst, 1)?;
        dst.put_u8(value as u8);
    } else if value <= u16::MAX as u32 {
        write_length(dst, 2)?;
        dst.put_u16(value as u16);
    } else {
        write_length(dst, 4)?;
        dst.put_u32(value);
    }
    Ok(())
}

/// Read a variable-width unconstrained integer.
pub fn read_integer(src: &mut Bytes) -> Result<u32> {
    let len = read_length(src)?;
    need(src, len)?;
    match len {
        1 => Ok(src.get_u8() as u32),
        2 => Ok(src.get_u16() as u32),
        4 => Ok(src.get_u32()),
        _ => Err(Asn1Error::IntegerTooWide(len)),
    }
}

/// Write a single-byte enumeration.
pub fn write_enumerated(dst: &mut BytesMut, value: u8) {
    dst.put_u8(value);
}

/// Read a single-byte enumeration.
pub fn read_enumerated(src: &mut Bytes) -> Result<u8> {
    need(src, 1)?;
    Ok(src.get_u8())
}
