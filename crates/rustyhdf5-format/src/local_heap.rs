//! HDF5 local heap header (HEAP) and data segment helpers.

use crate::bytes::{ensure_len, read_offset, write_offset};
use crate::error::FormatError;

/// Local heap signature.
pub const HEAP_SIGNATURE: [u8; 4] = *b"HEAP";

/// Parsed HDF5 local heap header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeap {
    /// Size of the data segment in bytes.
    pub data_segment_size: u64,
    /// Offset of the free list head within the data segment.
    pub free_list_head_offset: u64,
    /// File address of the data segment.
    pub data_segment_address: u64,
}

impl LocalHeap {
    /// Encoded header size: signature(4) + version(1) + reserved(3) +
    /// two lengths + one offset.
    pub fn header_len(offset_size: u8, length_size: u8) -> usize {
        8 + 2 * length_size as usize + offset_size as usize
    }

    /// Parse a local heap header at the given offset in `data`.
    pub fn parse(
        data: &[u8],
        offset: usize,
        offset_size: u8,
        length_size: u8,
    ) -> Result<LocalHeap, FormatError> {
        ensure_len(data, offset + Self::header_len(offset_size, length_size))?;

        if data[offset..offset + 4] != HEAP_SIGNATURE {
            return Err(FormatError::InvalidLocalHeapSignature);
        }
        let version = data[offset + 4];
        if version != 0 {
            return Err(FormatError::InvalidLocalHeapVersion(version));
        }

        let ls = length_size as usize;
        let mut pos = offset + 8;
        let data_segment_size = read_offset(data, pos, length_size)?;
        pos += ls;
        let free_list_head_offset = read_offset(data, pos, length_size)?;
        pos += ls;
        let data_segment_address = read_offset(data, pos, offset_size)?;

        Ok(LocalHeap {
            data_segment_size,
            free_list_head_offset,
            data_segment_address,
        })
    }

    /// Serialize the header.
    pub fn encode_header(&self, offset_size: u8, length_size: u8) -> Result<Vec<u8>, FormatError> {
        let mut buf = Vec::with_capacity(Self::header_len(offset_size, length_size));
        buf.extend_from_slice(&HEAP_SIGNATURE);
        buf.push(0); // version
        buf.extend_from_slice(&[0u8; 3]);
        write_offset(&mut buf, self.data_segment_size, length_size)
            .map_err(|_| FormatError::InvalidLengthSize(length_size))?;
        write_offset(&mut buf, self.free_list_head_offset, length_size)
            .map_err(|_| FormatError::InvalidLengthSize(length_size))?;
        write_offset(&mut buf, self.data_segment_address, offset_size)?;
        Ok(buf)
    }

    /// Whether the data segment immediately follows the header on disk.
    pub fn is_contiguous(&self, header_address: u64, offset_size: u8, length_size: u8) -> bool {
        self.data_segment_address
            == header_address + Self::header_len(offset_size, length_size) as u64
    }
}

/// Read a null-terminated string from a data segment at `string_offset`.
pub fn read_heap_string(segment: &[u8], string_offset: u64) -> Result<String, FormatError> {
    let start = string_offset as usize;
    if start >= segment.len() {
        return Err(FormatError::UnexpectedEof {
            expected: start + 1,
            available: segment.len(),
        });
    }
    let end = segment[start..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| start + p)
        .ok_or(FormatError::UnexpectedEof {
            expected: segment.len() + 1,
            available: segment.len(),
        })?;
    core::str::from_utf8(&segment[start..end])
        .map(String::from)
        .map_err(|_| FormatError::InvalidString)
}
