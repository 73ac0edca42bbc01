//! HDF5 symbol table entries and Symbol Table Nodes (SNOD).
//!
//! A symbol table node is a leaf of a group's v1 B-tree. On disk it always
//! occupies room for `2K` entries (K = group leaf node K from the
//! superblock); only the first `number_of_symbols` are meaningful and the
//! rest is zero-filled.

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::{ensure_len, read_offset, write_offset};
use crate::error::FormatError;

/// Symbol table node signature.
pub const SNOD_SIGNATURE: [u8; 4] = *b"SNOD";
/// Symbol table node version written by this crate.
pub const SNOD_VERSION: u8 = 1;
/// signature(4) + version(1) + reserved(1) + number_of_symbols(2)
const SNOD_HEADER_LEN: usize = 8;

/// A single symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTableEntry {
    /// Byte offset of the link name in the group's local heap.
    pub link_name_offset: u64,
    /// Address of the child object's header.
    pub object_header_address: u64,
    /// Cache type: 0=none, 1=group, 2=symbolic link.
    pub cache_type: u32,
    /// 16-byte scratch pad (cached data).
    pub scratch_pad: [u8; 16],
}

impl SymbolTableEntry {
    /// Encoded size of one entry for the given offset width.
    pub fn encoded_len(offset_size: u8) -> usize {
        // link_name_offset + obj_hdr_addr + cache_type(4) + reserved(4) + scratch(16)
        2 * offset_size as usize + 4 + 4 + 16
    }

    /// Parse one entry at `pos`.
    pub fn parse(data: &[u8], pos: usize, offset_size: u8) -> Result<SymbolTableEntry, FormatError> {
        ensure_len(data, pos + Self::encoded_len(offset_size))?;
        let os = offset_size as usize;
        let mut pos = pos;
        let link_name_offset = read_offset(data, pos, offset_size)?;
        pos += os;
        let object_header_address = read_offset(data, pos, offset_size)?;
        pos += os;
        let cache_type = LittleEndian::read_u32(&data[pos..pos + 4]);
        pos += 8; // cache type + reserved
        let mut scratch_pad = [0u8; 16];
        scratch_pad.copy_from_slice(&data[pos..pos + 16]);
        Ok(SymbolTableEntry {
            link_name_offset,
            object_header_address,
            cache_type,
            scratch_pad,
        })
    }

    /// Append the encoded entry to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>, offset_size: u8) -> Result<(), FormatError> {
        write_offset(buf, self.link_name_offset, offset_size)?;
        write_offset(buf, self.object_header_address, offset_size)?;
        buf.extend_from_slice(&self.cache_type.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
        buf.extend_from_slice(&self.scratch_pad);
        Ok(())
    }
}

/// A parsed Symbol Table Node (SNOD).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTableNode {
    /// The symbol table entries, in name order.
    pub entries: Vec<SymbolTableEntry>,
}

impl SymbolTableNode {
    /// On-disk size of a node that can hold `2 * leaf_k` entries.
    pub fn encoded_len(offset_size: u8, leaf_k: u16) -> usize {
        SNOD_HEADER_LEN + 2 * leaf_k as usize * SymbolTableEntry::encoded_len(offset_size)
    }

    /// Parse a Symbol Table Node at the given offset in `data`.
    pub fn parse(
        data: &[u8],
        offset: usize,
        offset_size: u8,
    ) -> Result<SymbolTableNode, FormatError> {
        ensure_len(data, offset + SNOD_HEADER_LEN)?;

        if data[offset..offset + 4] != SNOD_SIGNATURE {
            return Err(FormatError::InvalidSymbolTableNodeSignature);
        }
        let version = data[offset + 4];
        if version != SNOD_VERSION {
            return Err(FormatError::InvalidSymbolTableNodeVersion(version));
        }

        let num_symbols = LittleEndian::read_u16(&data[offset + 6..offset + 8]) as usize;
        let entry_len = SymbolTableEntry::encoded_len(offset_size);
        let entries_start = offset + SNOD_HEADER_LEN;
        ensure_len(data, entries_start + num_symbols * entry_len)?;

        let entries = (0..num_symbols)
            .map(|i| SymbolTableEntry::parse(data, entries_start + i * entry_len, offset_size))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SymbolTableNode { entries })
    }

    /// Serialize the node padded to its full `2 * leaf_k` capacity.
    pub fn encode(&self, offset_size: u8, leaf_k: u16) -> Result<Vec<u8>, FormatError> {
        // The on-disk symbol count is a u16 whatever the node's capacity.
        let capacity = (2 * leaf_k as usize).min(u16::MAX as usize);
        if self.entries.len() > capacity {
            return Err(FormatError::TooManySymbols {
                count: self.entries.len(),
                capacity,
            });
        }

        let total = Self::encoded_len(offset_size, leaf_k);
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&SNOD_SIGNATURE);
        buf.push(SNOD_VERSION);
        buf.push(0); // reserved
        buf.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for entry in &self.entries {
            entry.encode_into(&mut buf, offset_size)?;
        }
        buf.resize(total, 0);
        Ok(buf)
    }
}
