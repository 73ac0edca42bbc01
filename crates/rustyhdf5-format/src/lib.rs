//! Pure-Rust codecs for HDF5 file-level metadata.
//!
//! These are the serializers the metadata cache calls from its `load` and
//! `flush` callbacks: the superblock and driver information block, symbol
//! table nodes and local heaps. Every codec works on plain byte slices and
//! is byte-exact in both directions.

pub mod bytes;
pub mod checksum;
pub mod error;
pub mod local_heap;
pub mod signature;
pub mod superblock;
pub mod symbol_table;

pub use bytes::UNDEFINED_ADDRESS;
pub use error::FormatError;
