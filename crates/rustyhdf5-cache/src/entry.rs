//! Entry model: addresses, entry types, payload headers and call flags.

use bitflags::bitflags;

use crate::error::Result;
use crate::io::MetadataIo;
use crate::transfer::TransferContext;

/// File address of a metadata object.
pub type Addr = u64;

/// The undefined file address.
pub const UNDEFINED_ADDR: Addr = rustyhdf5_format::UNDEFINED_ADDRESS;

/// Small integer tag identifying an entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntryTypeId(pub u8);

impl core::fmt::Display for EntryTypeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity header embedded in every cached payload.
///
/// Stamped by the cache on load, insert and rename so that a payload handed
/// back to its owning subsystem still knows where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub addr: Addr,
    pub type_id: Option<EntryTypeId>,
}

impl Default for CacheInfo {
    fn default() -> Self {
        Self {
            addr: UNDEFINED_ADDR,
            type_id: None,
        }
    }
}

impl CacheInfo {
    pub fn new(addr: Addr, type_id: EntryTypeId) -> Self {
        Self {
            addr,
            type_id: Some(type_id),
        }
    }
}

/// A value that can live in the cache.
pub trait Cacheable: Send + 'static {
    fn cache_info(&self) -> &CacheInfo;
    fn cache_info_mut(&mut self) -> &mut CacheInfo;
}

/// One kind of on-disk structure the cache can hold.
///
/// Implementations are stateless descriptors: the instance registered with
/// the cache performs write-back and sizing, the instance the caller passes
/// to `protect` performs the load.
pub trait EntryType: Send + Sync + 'static {
    /// In-memory form of the structure.
    type Payload: Cacheable;
    /// Extra context `load` needs to decode the structure.
    type UserData: ?Sized;

    const ID: EntryTypeId;
    /// Human-readable name, diagnostics only.
    const NAME: &'static str;

    /// Materialize the structure at `addr`.
    ///
    /// Report `CacheError::NotFound` when no object lives at `addr`; any
    /// other error is wrapped into `LoadFailed` by the cache.
    fn load(
        &self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        addr: Addr,
        udata: &Self::UserData,
    ) -> Result<Self::Payload>;

    /// Serialize `payload` back to `addr`. `destroy` is set when the cache
    /// drops the payload right after a successful flush.
    fn flush(
        &self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        addr: Addr,
        payload: &mut Self::Payload,
        destroy: bool,
    ) -> Result<()>;

    /// On-disk footprint of `payload` in bytes, used for accounting.
    fn size(&self, io: &dyn MetadataIo, payload: &Self::Payload) -> usize;

    /// Drop any pending changes without writing them.
    fn clear(&self, _payload: &mut Self::Payload) -> Result<()> {
        Ok(())
    }
}

/// How a protector intends to use the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

bitflags! {
    /// Options for `flush_cache`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlushFlags: u8 {
        /// Evict every entry after the write pass.
        const INVALIDATE = 0b0000_0001;
        /// Mark dirty entries clean through `clear` without writing them.
        const CLEAR_ONLY = 0b0000_0010;
    }
}

bitflags! {
    /// Options for `unprotect`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct UnprotectFlags: u8 {
        /// The protector modified the payload.
        const DIRTIED = 0b0000_0001;
        /// Remove the entry without writing it.
        const DELETED = 0b0000_0010;
    }
}

/// Snapshot of one resident entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStatus {
    pub type_id: EntryTypeId,
    pub size: usize,
    pub is_dirty: bool,
    pub is_protected: bool,
}
