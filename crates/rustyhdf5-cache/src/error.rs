//! Error types for the metadata cache.

use rustyhdf5_format::FormatError;
use thiserror::Error;

use crate::entry::Addr;

/// Result alias used throughout the cache.
pub type Result<T, E = CacheError> = core::result::Result<T, E>;

/// Errors reported by the cache engine, the per-file binding and the entry
/// type callbacks.
///
/// Structural violations (`DuplicateAddress`, `TypeMismatch`,
/// `AlreadyProtected`, `NotProtected`) are programming errors and are never
/// retried. `LoadFailed` and `FlushFailed` wrap storage-layer failures; the
/// engine's own bookkeeping stays consistent when they occur.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Another resident entry already uses the address.
    #[error("an entry already resides at address {addr:#x}")]
    DuplicateAddress {
        /// The contested address.
        addr: Addr,
    },
    /// No entry (or no on-disk object) at the address.
    #[error("no entry at address {addr:#x}")]
    NotFound {
        /// The address that was looked up.
        addr: Addr,
    },
    /// The caller's entry type differs from the one recorded for the entry.
    #[error("type mismatch at address {addr:#x}: entry is {recorded}, caller passed {requested}")]
    TypeMismatch {
        /// Address of the entry.
        addr: Addr,
        /// Name of the type recorded in the cache.
        recorded: &'static str,
        /// Name of the type the caller passed.
        requested: &'static str,
    },
    /// The entry is already held by a protector.
    #[error("entry at address {addr:#x} is already protected")]
    AlreadyProtected {
        /// Address of the entry.
        addr: Addr,
    },
    /// Unprotect of an entry that is not currently protected.
    #[error("entry at address {addr:#x} is not protected")]
    NotProtected {
        /// Address of the entry.
        addr: Addr,
    },
    /// The `load` callback failed; nothing was inserted.
    #[error("failed to load entry at address {addr:#x}: {reason}")]
    LoadFailed {
        /// Address that was being loaded.
        addr: Addr,
        /// Description of the underlying failure.
        reason: String,
    },
    /// One or more `flush` callbacks failed; the entries stay dirty.
    #[error("{failed} flush(es) failed, first at address {first:#x}: {reason}")]
    FlushFailed {
        /// Number of entries whose flush failed.
        failed: usize,
        /// Address of the first failure.
        first: Addr,
        /// Description of the first failure.
        reason: String,
    },
    /// Destruction refused because entries are still protected.
    #[error("{count} protected entries remain")]
    ProtectedEntriesRemain {
        /// Number of protected entries.
        count: usize,
    },
    /// Destruction could not complete because the write-permission policy
    /// refused to write some dirty entries.
    #[error("{count} dirty entries could not be written")]
    DirtyEntriesRemain {
        /// Number of entries left resident and dirty.
        count: usize,
    },
    /// Bookkeeping structures could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// Bad configuration, unregistered type, undefined address and the like.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Storage adapter failure.
    #[error("I/O error: {0}")]
    Io(String),
    /// Codec failure inside a callback.
    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for CacheError {
    fn from(e: std::collections::TryReserveError) -> Self {
        CacheError::OutOfMemory(e.to_string())
    }
}

impl CacheError {
    /// Whether the error is one of the structural (programming) errors.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            CacheError::DuplicateAddress { .. }
                | CacheError::TypeMismatch { .. }
                | CacheError::AlreadyProtected { .. }
                | CacheError::NotProtected { .. }
        )
    }
}
