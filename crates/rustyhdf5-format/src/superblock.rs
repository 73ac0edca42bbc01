//! HDF5 superblock (versions 0 and 1) and driver information block codecs.
//!
//! The superblock is the file-level root of all metadata: address and
//! length widths, B-tree ranks, the base/free-space/EOF/driver-info
//! addresses and the root group's symbol table entry. Both directions are
//! byte-exact so a superblock that is loaded, left untouched and flushed
//! rewrites the same bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::{ensure_len, read_offset, validate_sizes, write_offset, UNDEFINED_ADDRESS};
use crate::checksum::{xor_fold, CHECKSUM_SIZE};
use crate::error::FormatError;
use crate::signature::HDF5_SIGNATURE;
use crate::symbol_table::SymbolTableEntry;

/// Fixed prefix of a v0 superblock, before the variable-width addresses.
const V0_FIXED_LEN: usize = 24;
/// Fixed prefix of a v1 superblock (adds indexed storage K and 2 reserved bytes).
const V1_FIXED_LEN: usize = 28;

/// Default group leaf node K.
pub const DEFAULT_GROUP_LEAF_K: u16 = 4;
/// Default group internal node K.
pub const DEFAULT_GROUP_INTERNAL_K: u16 = 16;
/// Default indexed storage internal node K (v1 only).
pub const DEFAULT_INDEXED_STORAGE_K: u16 = 32;

/// Parsed HDF5 superblock, version 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Superblock version (0 or 1).
    pub version: u8,
    /// Size of offsets in bytes (2, 4, or 8).
    pub offset_size: u8,
    /// Size of lengths in bytes (2, 4, or 8).
    pub length_size: u8,
    /// Group leaf node K (B-tree rank for symbol table nodes).
    pub group_leaf_node_k: u16,
    /// Group internal node K.
    pub group_internal_node_k: u16,
    /// Indexed storage internal node K. Present exactly when `version == 1`.
    pub indexed_storage_internal_node_k: Option<u16>,
    /// File consistency flags.
    pub consistency_flags: u32,
    /// File base address; all other addresses are relative to it.
    pub base_address: u64,
    /// Global free-space index address, usually undefined.
    pub free_space_address: u64,
    /// End-of-file address.
    pub eof_address: u64,
    /// Driver information block address, undefined when absent.
    pub driver_info_address: u64,
    /// Symbol table entry of the root group.
    pub root_symbol_table_entry: SymbolTableEntry,
}

impl Superblock {
    /// A version 0 superblock with 8-byte widths, default ranks and a root
    /// group whose object header lives at `root_object_header`.
    pub fn new_v0(eof_address: u64, root_object_header: u64) -> Self {
        Superblock {
            version: 0,
            offset_size: 8,
            length_size: 8,
            group_leaf_node_k: DEFAULT_GROUP_LEAF_K,
            group_internal_node_k: DEFAULT_GROUP_INTERNAL_K,
            indexed_storage_internal_node_k: None,
            consistency_flags: 0,
            base_address: 0,
            free_space_address: UNDEFINED_ADDRESS,
            eof_address,
            driver_info_address: UNDEFINED_ADDRESS,
            root_symbol_table_entry: SymbolTableEntry {
                link_name_offset: 0,
                object_header_address: root_object_header,
                cache_type: 0,
                scratch_pad: [0u8; 16],
            },
        }
    }

    /// Whether a driver information block follows the superblock.
    pub fn has_driver_info(&self) -> bool {
        self.driver_info_address != UNDEFINED_ADDRESS
    }

    /// Parse a superblock from `data` starting at `signature_offset`.
    pub fn parse(data: &[u8], signature_offset: usize) -> Result<Superblock, FormatError> {
        ensure_len(data, signature_offset + 9)?;
        let d = &data[signature_offset..];

        if d[..8] != HDF5_SIGNATURE {
            return Err(FormatError::SignatureNotFound);
        }

        let version = d[8];
        let fixed_len = match version {
            0 => V0_FIXED_LEN,
            1 => V1_FIXED_LEN,
            v => return Err(FormatError::UnsupportedVersion(v)),
        };
        ensure_len(d, fixed_len)?;

        // d[9..13]: free-space, root group, reserved, shared header versions
        let offset_size = d[13];
        let length_size = d[14];
        validate_sizes(offset_size, length_size)?;

        let group_leaf_node_k = LittleEndian::read_u16(&d[16..18]);
        let group_internal_node_k = LittleEndian::read_u16(&d[18..20]);
        let (indexed_storage_internal_node_k, flags_pos) = if version == 1 {
            (Some(LittleEndian::read_u16(&d[20..22])), 24)
        } else {
            (None, 20)
        };
        let consistency_flags = LittleEndian::read_u32(&d[flags_pos..flags_pos + 4]);

        let os = offset_size as usize;
        ensure_len(d, fixed_len + 4 * os + SymbolTableEntry::encoded_len(offset_size))?;

        let mut pos = fixed_len;
        let base_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let free_space_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let eof_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let driver_info_address = read_offset(d, pos, offset_size)?;
        pos += os;
        let root_symbol_table_entry = SymbolTableEntry::parse(d, pos, offset_size)?;

        Ok(Superblock {
            version,
            offset_size,
            length_size,
            group_leaf_node_k,
            group_internal_node_k,
            indexed_storage_internal_node_k,
            consistency_flags,
            base_address,
            free_space_address,
            eof_address,
            driver_info_address,
            root_symbol_table_entry,
        })
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        let fixed = if self.version == 1 {
            V1_FIXED_LEN
        } else {
            V0_FIXED_LEN
        };
        fixed + 4 * self.offset_size as usize + SymbolTableEntry::encoded_len(self.offset_size)
    }

    /// Serialize the superblock, signature included.
    pub fn encode(&self) -> Result<Vec<u8>, FormatError> {
        if self.version > 1 {
            return Err(FormatError::UnsupportedVersion(self.version));
        }
        validate_sizes(self.offset_size, self.length_size)?;

        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&HDF5_SIGNATURE);
        buf.push(self.version);
        buf.push(0); // free-space storage version
        buf.push(0); // root group symbol table entry version
        buf.push(0); // reserved
        buf.push(0); // shared header message format version
        buf.push(self.offset_size);
        buf.push(self.length_size);
        buf.push(0); // reserved
        buf.extend_from_slice(&self.group_leaf_node_k.to_le_bytes());
        buf.extend_from_slice(&self.group_internal_node_k.to_le_bytes());
        if self.version == 1 {
            let k = self
                .indexed_storage_internal_node_k
                .unwrap_or(DEFAULT_INDEXED_STORAGE_K);
            buf.extend_from_slice(&k.to_le_bytes());
            buf.extend_from_slice(&0u16.to_le_bytes()); // reserved
        }
        buf.extend_from_slice(&self.consistency_flags.to_le_bytes());

        write_offset(&mut buf, self.base_address, self.offset_size)?;
        write_offset(&mut buf, self.free_space_address, self.offset_size)?;
        write_offset(&mut buf, self.eof_address, self.offset_size)?;
        write_offset(&mut buf, self.driver_info_address, self.offset_size)?;
        self.root_symbol_table_entry
            .encode_into(&mut buf, self.offset_size)?;

        debug_assert_eq!(buf.len(), self.encoded_len());
        Ok(buf)
    }
}

/// Driver information block.
///
/// Layout: version (1, always 0), reserved (3), info size (4), driver id
/// (8 ASCII bytes, e.g. `NCSAmult`), driver info (info size bytes), then
/// the XOR-fold checksum of everything before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    /// Eight-byte driver identification.
    pub driver_id: [u8; 8],
    /// Driver-specific payload.
    pub info: Vec<u8>,
}

/// Header bytes of a driver information block before the payload.
const DRIVER_INFO_HEADER_LEN: usize = 16;

impl DriverInfo {
    /// Encoded size in bytes, checksum included.
    pub fn encoded_len(&self) -> usize {
        DRIVER_INFO_HEADER_LEN + self.info.len() + CHECKSUM_SIZE
    }

    /// Parse a driver information block starting at `data[0]` and verify
    /// its checksum.
    pub fn parse(data: &[u8]) -> Result<DriverInfo, FormatError> {
        ensure_len(data, DRIVER_INFO_HEADER_LEN)?;
        let version = data[0];
        if version != 0 {
            return Err(FormatError::InvalidDriverInfoVersion(version));
        }
        let info_len = LittleEndian::read_u32(&data[4..8]) as usize;
        let body_len = DRIVER_INFO_HEADER_LEN + info_len;
        ensure_len(data, body_len + CHECKSUM_SIZE)?;

        let expected = LittleEndian::read_u32(&data[body_len..body_len + CHECKSUM_SIZE]);
        let computed = xor_fold(&data[..body_len]);
        if expected != computed {
            return Err(FormatError::ChecksumMismatch { expected, computed });
        }

        let mut driver_id = [0u8; 8];
        driver_id.copy_from_slice(&data[8..16]);
        Ok(DriverInfo {
            driver_id,
            info: data[DRIVER_INFO_HEADER_LEN..body_len].to_vec(),
        })
    }

    /// Serialize the block with its trailing checksum.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(0); // version
        buf.extend_from_slice(&[0u8; 3]);
        buf.extend_from_slice(&(self.info.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.driver_id);
        buf.extend_from_slice(&self.info);
        let sum = xor_fold(&buf);
        buf.extend_from_slice(&sum.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v1(offset_size: u8) -> Superblock {
        Superblock {
            version: 1,
            offset_size,
            length_size: offset_size,
            group_leaf_node_k: 4,
            group_internal_node_k: 16,
            indexed_storage_internal_node_k: Some(32),
            consistency_flags: 0,
            base_address: 0,
            free_space_address: UNDEFINED_ADDRESS,
            eof_address: 8192,
            driver_info_address: UNDEFINED_ADDRESS,
            root_symbol_table_entry: SymbolTableEntry {
                link_name_offset: 0,
                object_header_address: 200,
                cache_type: 1,
                scratch_pad: [7u8; 16],
            },
        }
    }

    #[test]
    fn v0_layout_is_byte_exact() {
        let sb = Superblock::new_v0(4096, 96);
        let bytes = sb.encode().unwrap();
        assert_eq!(bytes.len(), 24 + 32 + 40);
        assert_eq!(&bytes[..8], &HDF5_SIGNATURE);
        assert_eq!(bytes[8], 0);
        assert_eq!(bytes[13], 8);
        assert_eq!(bytes[14], 8);
        assert_eq!(&bytes[16..18], &4u16.to_le_bytes());
        assert_eq!(&bytes[18..20], &16u16.to_le_bytes());
        // eof address is the third address after the fixed prefix
        assert_eq!(&bytes[40..48], &4096u64.to_le_bytes());
        assert_eq!(Superblock::parse(&bytes, 0).unwrap(), sb);
    }

    #[test]
    fn v1_carries_indexed_storage_k() {
        let sb = sample_v1(8);
        let bytes = sb.encode().unwrap();
        assert_eq!(&bytes[20..22], &32u16.to_le_bytes());
        let back = Superblock::parse(&bytes, 0).unwrap();
        assert_eq!(back.indexed_storage_internal_node_k, Some(32));
        assert_eq!(back.root_symbol_table_entry.scratch_pad, [7u8; 16]);
    }

    #[test]
    fn four_byte_offsets_keep_undefined_addresses() {
        let sb = sample_v1(4);
        let bytes = sb.encode().unwrap();
        let back = Superblock::parse(&bytes, 0).unwrap();
        assert_eq!(back.free_space_address, UNDEFINED_ADDRESS);
        assert!(!back.has_driver_info());
        assert_eq!(back, sb);
    }

    #[test]
    fn parse_at_nonzero_offset() {
        let mut data = vec![0u8; 1024];
        let sb = Superblock::new_v0(4096, 96).encode().unwrap();
        data[512..512 + sb.len()].copy_from_slice(&sb);
        let parsed = Superblock::parse(&data, 512).unwrap();
        assert_eq!(parsed.root_symbol_table_entry.object_header_address, 96);
    }

    #[test]
    fn unsupported_version() {
        let mut data = vec![0u8; 128];
        data[..8].copy_from_slice(&HDF5_SIGNATURE);
        data[8] = 2;
        assert_eq!(
            Superblock::parse(&data, 0),
            Err(FormatError::UnsupportedVersion(2))
        );
        let mut sb = Superblock::new_v0(0, 0);
        sb.version = 3;
        assert_eq!(sb.encode(), Err(FormatError::UnsupportedVersion(3)));
    }

    #[test]
    fn invalid_widths() {
        let mut data = Superblock::new_v0(4096, 96).encode().unwrap();
        data[13] = 3;
        assert_eq!(
            Superblock::parse(&data, 0),
            Err(FormatError::InvalidOffsetSize(3))
        );
        data[13] = 8;
        data[14] = 5;
        assert_eq!(
            Superblock::parse(&data, 0),
            Err(FormatError::InvalidLengthSize(5))
        );
    }

    #[test]
    fn truncated_superblock() {
        let bytes = Superblock::new_v0(4096, 96).encode().unwrap();
        assert!(matches!(
            Superblock::parse(&bytes[..bytes.len() - 1], 0),
            Err(FormatError::UnexpectedEof { .. })
        ));
        assert!(matches!(
            Superblock::parse(&HDF5_SIGNATURE, 0),
            Err(FormatError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn driver_info_checksum_trailer() {
        let di = DriverInfo {
            driver_id: *b"NCSAmult",
            info: vec![1, 2, 3, 4, 5],
        };
        let bytes = di.encode();
        assert_eq!(bytes.len(), di.encoded_len());
        let body = &bytes[..bytes.len() - CHECKSUM_SIZE];
        assert_eq!(
            &bytes[bytes.len() - CHECKSUM_SIZE..],
            &xor_fold(body).to_le_bytes()
        );
        assert_eq!(DriverInfo::parse(&bytes).unwrap(), di);
    }

    #[test]
    fn driver_info_detects_corruption() {
        let mut bytes = DriverInfo {
            driver_id: *b"NCSAfami",
            info: vec![9; 12],
        }
        .encode();
        bytes[17] ^= 0x40;
        assert!(matches!(
            DriverInfo::parse(&bytes),
            Err(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn driver_info_bad_version() {
        let mut bytes = DriverInfo {
            driver_id: [0; 8],
            info: Vec::new(),
        }
        .encode();
        bytes[0] = 1;
        assert_eq!(
            DriverInfo::parse(&bytes),
            Err(FormatError::InvalidDriverInfoVersion(1))
        );
    }
}
