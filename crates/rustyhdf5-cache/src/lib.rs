//! HDF5 metadata cache.
//!
//! [`Cache`] keeps on-disk metadata objects resident under a byte budget,
//! guarantees at most one live copy per file address and enforces
//! protect/unprotect discipline: a protected entry's payload is moved out to
//! its single holder and cannot be evicted, flushed or protected again until
//! it is handed back. Dirty entries are written back through their
//! [`EntryType`] only when the [`WritePermissionPolicy`] allows it.
//!
//! [`FileCache`] binds one cache to one open file and is the surface the
//! rest of the library uses.
//!
//! ```
//! use rustyhdf5_cache::{AccessMode, FileCache, FlushFlags, MemoryFile, UnprotectFlags};
//! use rustyhdf5_cache::types::{LocalHeapEntry, LocalHeapType};
//!
//! let mut file = FileCache::create(MemoryFile::new(), 0).unwrap();
//! let ctx = file.default_context().clone();
//!
//! let mut heap = LocalHeapEntry::new(0x80);
//! let name = heap.insert_string("group").unwrap();
//! file.set(&ctx, &LocalHeapType, 0x40, heap).unwrap();
//! file.flush(FlushFlags::empty()).unwrap();
//!
//! let heap = file
//!     .protect(&ctx, &LocalHeapType, 0x40, &(), AccessMode::Read)
//!     .unwrap();
//! assert_eq!(heap.string_at(name).unwrap(), "group");
//! file.unprotect(&LocalHeapType, 0x40, heap, UnprotectFlags::empty())
//!     .unwrap();
//! file.dest().unwrap();
//! ```

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod file_cache;
pub mod io;
mod lru;
pub mod policy;
pub mod registry;
pub mod stats;
pub mod transfer;
pub mod types;

pub use cache::Cache;
pub use config::CacheConfig;
pub use entry::{
    AccessMode, Addr, CacheInfo, Cacheable, EntryStatus, EntryType, EntryTypeId, FlushFlags,
    UnprotectFlags, UNDEFINED_ADDR,
};
pub use error::{CacheError, Result};
pub use file_cache::FileCache;
pub use io::{MemoryFile, MetadataIo, StdFile};
pub use policy::{AlwaysPermitted, CollectiveOnly, NeverPermitted, WritePermissionPolicy};
pub use registry::TypeRegistry;
pub use stats::{CacheStats, TypeStats};
pub use transfer::{TransferContext, TransferMode};
