//! Little-endian helpers for variable-width file addresses and lengths.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::FormatError;

/// The "undefined address" sentinel: all bits set, whatever the width.
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

pub(crate) fn ensure_len(data: &[u8], needed: usize) -> Result<(), FormatError> {
    if data.len() < needed {
        Err(FormatError::UnexpectedEof {
            expected: needed,
            available: data.len(),
        })
    } else {
        Ok(())
    }
}

pub(crate) fn validate_sizes(offset_size: u8, length_size: u8) -> Result<(), FormatError> {
    if !matches!(offset_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidOffsetSize(offset_size));
    }
    if !matches!(length_size, 2 | 4 | 8) {
        return Err(FormatError::InvalidLengthSize(length_size));
    }
    Ok(())
}

/// Read an unsigned integer of `size` bytes (LE) from `data` at `pos`.
///
/// A value whose bits are all set is widened to [`UNDEFINED_ADDRESS`] so
/// that undefined addresses compare equal across widths.
pub(crate) fn read_offset(data: &[u8], pos: usize, size: u8) -> Result<u64, FormatError> {
    let s = size as usize;
    ensure_len(data, pos + s)?;
    let slice = &data[pos..pos + s];
    let value = match size {
        2 => LittleEndian::read_u16(slice) as u64,
        4 => LittleEndian::read_u32(slice) as u64,
        8 => LittleEndian::read_u64(slice),
        _ => return Err(FormatError::InvalidOffsetSize(size)),
    };
    if s < 8 && value == (1u64 << (s * 8)) - 1 {
        return Ok(UNDEFINED_ADDRESS);
    }
    Ok(value)
}

/// Append `value` as a `size`-byte LE integer. Values wider than `size` are
/// truncated, which maps [`UNDEFINED_ADDRESS`] to all-ones at every width.
pub(crate) fn write_offset(buf: &mut Vec<u8>, value: u64, size: u8) -> Result<(), FormatError> {
    match size {
        2 => buf.extend_from_slice(&(value as u16).to_le_bytes()),
        4 => buf.extend_from_slice(&(value as u32).to_le_bytes()),
        8 => buf.extend_from_slice(&value.to_le_bytes()),
        _ => return Err(FormatError::InvalidOffsetSize(size)),
    }
    Ok(())
}
