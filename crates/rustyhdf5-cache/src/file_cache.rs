//! Per-file binding of the cache engine.
//!
//! A [`FileCache`] owns the file's storage handle and exactly one
//! [`Cache`], pre-binds the file's write-permission policy and carries the
//! default transfer contexts the rest of the library uses.

use rustyhdf5_format::signature::{is_signature, signature_offsets, HDF5_SIGNATURE};
use rustyhdf5_format::FormatError;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::config::CacheConfig;
use crate::entry::{AccessMode, Addr, Cacheable, EntryType, FlushFlags, UnprotectFlags};
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::policy::{AlwaysPermitted, WritePermissionPolicy};
use crate::registry::TypeRegistry;
use crate::stats::CacheStats;
use crate::transfer::TransferContext;
use crate::types::builtin_types;

/// The metadata cache of one open file.
pub struct FileCache<S: MetadataIo> {
    io: S,
    cache: Option<Cache>,
    default_ctx: TransferContext,
    independent_ctx: TransferContext,
}

impl<S: MetadataIo> FileCache<S> {
    /// Open a cache over `io` with the built-in entry types and the
    /// always-permitted write policy.
    ///
    /// A zero `size_hint` selects the default sizes, any other value
    /// becomes the maximum cache size (see [`CacheConfig::from_size_hint`]).
    pub fn create(io: S, size_hint: usize) -> Result<Self> {
        Self::create_with(io, size_hint, builtin_types()?, AlwaysPermitted)
    }

    /// Open a cache with explicit entry types and write policy.
    pub fn create_with(
        io: S,
        size_hint: usize,
        types: TypeRegistry,
        policy: impl WritePermissionPolicy + 'static,
    ) -> Result<Self> {
        Self::with_config(io, CacheConfig::from_size_hint(size_hint), types, policy)
    }

    /// Open a cache with a full configuration.
    pub fn with_config(
        io: S,
        config: CacheConfig,
        types: TypeRegistry,
        policy: impl WritePermissionPolicy + 'static,
    ) -> Result<Self> {
        let cache = Cache::new(config, types, policy)?;
        Ok(Self {
            io,
            cache: Some(cache),
            default_ctx: TransferContext::collective().label("default"),
            independent_ctx: TransferContext::independent().label("independent"),
        })
    }

    /// Flush everything and tear the cache down.
    ///
    /// Fails with `ProtectedEntriesRemain`, keeping the cache, while any
    /// entry is protected.
    pub fn dest(&mut self) -> Result<()> {
        let ctx = self.default_ctx.clone();
        self.dest_with(&ctx)
    }

    pub fn dest_with(&mut self, ctx: &TransferContext) -> Result<()> {
        let Some(cache) = self.cache.as_mut() else {
            return Err(not_active());
        };
        cache.dest(&mut self.io, ctx)?;
        self.cache = None;
        Ok(())
    }

    /// Flush with the default (collective) transfer context.
    pub fn flush(&mut self, flags: FlushFlags) -> Result<()> {
        let ctx = self.default_ctx.clone();
        self.flush_with(&ctx, flags)
    }

    pub fn flush_with(&mut self, ctx: &TransferContext, flags: FlushFlags) -> Result<()> {
        let (cache, io) = self.parts()?;
        cache.flush_cache(io, ctx, flags)
    }

    /// Add a freshly created object: it becomes resident, dirty and
    /// unprotected.
    pub fn set<C: EntryType>(
        &mut self,
        ctx: &TransferContext,
        ty: &C,
        addr: Addr,
        payload: C::Payload,
    ) -> Result<()> {
        let (cache, io) = self.parts()?;
        let payload = cache.insert_entry(io, ctx, ty, addr, payload)?;
        cache.unprotect(&*io, ty, addr, payload, UnprotectFlags::DIRTIED)?;
        Ok(())
    }

    /// Move a resident object to a new address.
    pub fn rename<C: EntryType>(&mut self, ty: &C, old: Addr, new: Addr) -> Result<()> {
        let (cache, _) = self.parts()?;
        cache.rename_entry(ty, old, new)
    }

    /// Take exclusive hold of the object at `addr`.
    pub fn protect<C: EntryType>(
        &mut self,
        ctx: &TransferContext,
        ty: &C,
        addr: Addr,
        udata: &C::UserData,
        mode: AccessMode,
    ) -> Result<C::Payload> {
        let (cache, io) = self.parts()?;
        debug_assert!(
            !cache.entry_status(addr).is_some_and(|s| s.is_protected),
            "protect of an entry already known protected at {addr:#x}"
        );
        let payload = cache.protect(io, ctx, ty, addr, udata, mode)?;
        debug_assert_eq!(payload.cache_info().addr, addr);
        debug_assert_eq!(payload.cache_info().type_id, Some(C::ID));
        Ok(payload)
    }

    /// Hand a protected object back. See [`Cache::unprotect`].
    pub fn unprotect<C: EntryType>(
        &mut self,
        ty: &C,
        addr: Addr,
        payload: C::Payload,
        flags: UnprotectFlags,
    ) -> Result<Option<C::Payload>> {
        let (cache, io) = self.parts()?;
        cache.unprotect(&*io, ty, addr, payload, flags)
    }

    /// Find where the superblock starts by checking the signature at 0,
    /// 512, 1024, ... directly in storage.
    ///
    /// This is the bootstrap step before the superblock itself can be
    /// protected; it works whether or not the cache is still open.
    pub fn locate_superblock(&mut self) -> Result<Addr> {
        let mut window = [0u8; HDF5_SIGNATURE.len()];
        for offset in signature_offsets(self.io.len()) {
            self.io.read_at(offset, &mut window)?;
            if is_signature(&window) {
                debug!(
                    target: "rustyhdf5::cache",
                    addr = format_args!("{offset:#x}"),
                    "superblock signature found"
                );
                return Ok(offset);
            }
        }
        Err(CacheError::Format(FormatError::SignatureNotFound))
    }

    /// Log the statistics table and return a snapshot. `None` once the
    /// cache has been destroyed.
    pub fn stats(&self) -> Option<CacheStats> {
        let stats = self.cache.as_ref()?.stats().clone();
        info!(target: "rustyhdf5::cache", "metadata cache statistics\n{stats}");
        Some(stats)
    }

    /// The collective context used by [`flush`](Self::flush) and
    /// [`dest`](Self::dest).
    pub fn default_context(&self) -> &TransferContext {
        &self.default_ctx
    }

    pub fn independent_context(&self) -> &TransferContext {
        &self.independent_ctx
    }

    pub fn is_open(&self) -> bool {
        self.cache.is_some()
    }

    pub fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    pub fn io(&self) -> &S {
        &self.io
    }

    /// Direct storage access, bypassing the cache. Only for bootstrapping
    /// (reading the superblock location) or after the cache is gone.
    pub fn io_mut(&mut self) -> &mut S {
        &mut self.io
    }

    /// Give back the storage. Fails unless the cache has been destroyed.
    pub fn into_inner(self) -> core::result::Result<S, Self> {
        if self.cache.is_some() {
            return Err(self);
        }
        Ok(self.io)
    }

    fn parts(&mut self) -> Result<(&mut Cache, &mut S)> {
        match self.cache.as_mut() {
            Some(cache) => Ok((cache, &mut self.io)),
            None => Err(not_active()),
        }
    }
}

fn not_active() -> CacheError {
    CacheError::InvalidArgument("cache not active".to_string())
}

impl<S: MetadataIo> core::fmt::Debug for FileCache<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FileCache")
            .field("cache", &self.cache)
            .field("len", &self.io.len())
            .finish_non_exhaustive()
    }
}
