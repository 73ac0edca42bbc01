//! Error types for HDF5 metadata encoding and decoding.

use thiserror::Error;

/// Errors that can occur when parsing or serializing HDF5 metadata structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// The HDF5 magic signature was not found at any valid offset.
    #[error("HDF5 signature not found at any valid offset")]
    SignatureNotFound,
    /// The superblock version is not supported.
    #[error("unsupported superblock version: {0}")]
    UnsupportedVersion(u8),
    /// Unexpected end of data.
    #[error("unexpected EOF: need {expected} bytes, have {available}")]
    UnexpectedEof {
        /// Number of bytes expected.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },
    /// Invalid offset size (must be 2, 4, or 8).
    #[error("invalid offset size: {0} (must be 2, 4, or 8)")]
    InvalidOffsetSize(u8),
    /// Invalid length size (must be 2, 4, or 8).
    #[error("invalid length size: {0} (must be 2, 4, or 8)")]
    InvalidLengthSize(u8),
    /// Symbol table node does not start with `SNOD`.
    #[error("invalid symbol table node signature")]
    InvalidSymbolTableNodeSignature,
    /// Symbol table node version other than 1.
    #[error("invalid symbol table node version: {0}")]
    InvalidSymbolTableNodeVersion(u8),
    /// Local heap does not start with `HEAP`.
    #[error("invalid local heap signature")]
    InvalidLocalHeapSignature,
    /// Local heap version other than 0.
    #[error("invalid local heap version: {0}")]
    InvalidLocalHeapVersion(u8),
    /// Driver information block version other than 0.
    #[error("invalid driver info block version: {0}")]
    InvalidDriverInfoVersion(u8),
    /// Stored checksum does not match the one computed over the block.
    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// The checksum stored in the file.
        expected: u32,
        /// The checksum we computed.
        computed: u32,
    },
    /// A symbol table node holds more entries than its on-disk capacity.
    #[error("symbol table node holds {count} entries, capacity is {capacity}")]
    TooManySymbols {
        /// Number of entries in the node.
        count: usize,
        /// Maximum number of entries (2K).
        capacity: usize,
    },
    /// A heap string is not valid UTF-8.
    #[error("heap string is not valid UTF-8")]
    InvalidString,
}
