//! The metadata cache engine.
//!
//! Entries are keyed by file address. A resident entry is either on the LRU
//! list (unprotected, payload owned by the cache) or protected (payload
//! moved out to exactly one caller until it is handed back through
//! [`Cache::unprotect`]). Write-back of dirty entries is gated per attempt
//! by the configured [`WritePermissionPolicy`].

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, trace, warn};

use crate::config::CacheConfig;
use crate::entry::{
    AccessMode, Addr, CacheInfo, Cacheable, EntryStatus, EntryType, EntryTypeId, FlushFlags,
    UnprotectFlags, UNDEFINED_ADDR,
};
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::lru::{LruList, SlabIdx};
use crate::policy::WritePermissionPolicy;
use crate::registry::{ErasedPayload, TypeRegistry};
use crate::stats::{CacheStats, TypeStats};
use crate::transfer::TransferContext;

const INITIAL_INDEX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residency {
    Unprotected(SlabIdx),
    Protected(AccessMode),
}

struct EntryRecord {
    type_id: EntryTypeId,
    /// `None` exactly while the entry is protected.
    payload: Option<ErasedPayload>,
    size: usize,
    dirty: bool,
    state: Residency,
}

impl EntryRecord {
    fn is_protected(&self) -> bool {
        matches!(self.state, Residency::Protected(_))
    }
}

/// Result of one write-back attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteBack {
    Written,
    Denied,
}

/// Generic metadata cache over one file.
pub struct Cache {
    config: CacheConfig,
    types: TypeRegistry,
    policy: Box<dyn WritePermissionPolicy>,
    index: HashMap<Addr, EntryRecord>,
    lru: LruList<Addr>,
    protected: BTreeSet<Addr>,
    total_size: usize,
    dirty_size: usize,
    stats: CacheStats,
}

impl Cache {
    /// Create an empty cache.
    ///
    /// Fails with `InvalidArgument` for an inconsistent configuration and
    /// with `OutOfMemory` when the index cannot be allocated.
    pub fn new(
        config: CacheConfig,
        types: TypeRegistry,
        policy: impl WritePermissionPolicy + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let mut index = HashMap::new();
        index.try_reserve(INITIAL_INDEX_CAPACITY)?;

        let mut stats = CacheStats::default();
        for (id, name) in types.iter() {
            stats.type_mut(id.0, name);
        }

        info!(
            target: "rustyhdf5::cache",
            max_size = config.max_size,
            min_clean_size = config.min_clean_size,
            types = types.len(),
            "cache created"
        );

        Ok(Self {
            config,
            types,
            policy: Box::new(policy),
            index,
            lru: LruList::new(),
            protected: BTreeSet::new(),
            total_size: 0,
            dirty_size: 0,
            stats,
        })
    }

    // ── Entry lifecycle ──────────────────────────────────────────────────

    /// Add a brand-new entry at `addr` in the protected state.
    ///
    /// The stamped payload is handed straight back to the caller, who now
    /// holds the entry and must eventually [`unprotect`](Self::unprotect) it.
    pub fn insert_entry<C: EntryType>(
        &mut self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        ty: &C,
        addr: Addr,
        mut payload: C::Payload,
    ) -> Result<C::Payload> {
        check_addr(addr)?;
        self.types.handle_for::<C>()?;
        if self.index.contains_key(&addr) {
            return Err(CacheError::DuplicateAddress { addr });
        }

        *payload.cache_info_mut() = CacheInfo::new(addr, C::ID);
        let size = ty.size(&*io, &payload);
        self.make_space(io, ctx, size);

        self.index.try_reserve(1)?;
        self.index.insert(
            addr,
            EntryRecord {
                type_id: C::ID,
                payload: None,
                size,
                dirty: false,
                state: Residency::Protected(AccessMode::Write),
            },
        );
        self.protected.insert(addr);
        self.total_size += size;
        self.counters(C::ID).insertions += 1;
        self.observe();

        debug!(
            target: "rustyhdf5::cache",
            addr = format_args!("{addr:#x}"),
            kind = C::NAME,
            size,
            "entry inserted"
        );
        Ok(payload)
    }

    /// Take exclusive hold of the entry at `addr`, loading it on a miss.
    pub fn protect<C: EntryType>(
        &mut self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        ty: &C,
        addr: Addr,
        udata: &C::UserData,
        mode: AccessMode,
    ) -> Result<C::Payload> {
        check_addr(addr)?;
        self.types.handle_for::<C>()?;

        if self.index.contains_key(&addr) {
            return self.protect_resident::<C>(addr, mode);
        }

        if self.total_size > self.config.max_size {
            self.make_space(io, ctx, 0);
        }

        let mut payload = ty.load(io, ctx, addr, udata).map_err(|e| match e {
            CacheError::NotFound { .. } | CacheError::LoadFailed { .. } => e,
            other => CacheError::LoadFailed {
                addr,
                reason: other.to_string(),
            },
        })?;
        *payload.cache_info_mut() = CacheInfo::new(addr, C::ID);
        let size = ty.size(&*io, &payload);
        self.make_space(io, ctx, size);

        self.index.try_reserve(1)?;
        self.index.insert(
            addr,
            EntryRecord {
                type_id: C::ID,
                payload: None,
                size,
                dirty: false,
                state: Residency::Protected(mode),
            },
        );
        self.protected.insert(addr);
        self.total_size += size;
        self.counters(C::ID).misses += 1;
        self.observe();

        debug!(
            target: "rustyhdf5::cache",
            addr = format_args!("{addr:#x}"),
            kind = C::NAME,
            size,
            dxpl = ctx.label_str(),
            "entry loaded"
        );
        Ok(payload)
    }

    fn protect_resident<C: EntryType>(&mut self, addr: Addr, mode: AccessMode) -> Result<C::Payload> {
        let recorded = {
            let Some(record) = self.index.get(&addr) else {
                return Err(CacheError::NotFound { addr });
            };
            if record.is_protected() {
                return Err(CacheError::AlreadyProtected { addr });
            }
            record.type_id
        };
        if recorded != C::ID {
            return Err(self.type_mismatch::<C>(addr, recorded));
        }

        let Some(record) = self.index.get_mut(&addr) else {
            return Err(CacheError::NotFound { addr });
        };
        let Residency::Unprotected(idx) = record.state else {
            return Err(CacheError::AlreadyProtected { addr });
        };
        let boxed = record.payload.take().ok_or_else(|| {
            CacheError::InvalidArgument(format!("resident entry at {addr:#x} has no payload"))
        })?;
        let payload = match boxed.downcast::<C::Payload>() {
            Ok(payload) => payload,
            Err(boxed) => {
                record.payload = Some(boxed);
                return Err(CacheError::InvalidArgument(format!(
                    "payload at {addr:#x} is not a {} payload",
                    C::NAME
                )));
            }
        };
        record.state = Residency::Protected(mode);
        self.lru.remove(idx);
        self.protected.insert(addr);
        self.counters(C::ID).hits += 1;

        trace!(
            target: "rustyhdf5::cache",
            addr = format_args!("{addr:#x}"),
            kind = C::NAME,
            "hit"
        );
        Ok(*payload)
    }

    /// Hand a protected payload back to the cache.
    ///
    /// With [`UnprotectFlags::DELETED`] the entry is cleared and removed
    /// without being written, and the payload is returned to the caller.
    /// Otherwise the entry joins the MRU end of the LRU list, dirty if
    /// [`UnprotectFlags::DIRTIED`] is set or it already was, and `None` is
    /// returned. Errors are reported before any state changes.
    pub fn unprotect<C: EntryType>(
        &mut self,
        io: &dyn MetadataIo,
        ty: &C,
        addr: Addr,
        mut payload: C::Payload,
        flags: UnprotectFlags,
    ) -> Result<Option<C::Payload>> {
        let (recorded, mode) = match self.index.get(&addr) {
            Some(EntryRecord {
                type_id,
                state: Residency::Protected(mode),
                ..
            }) => (*type_id, *mode),
            _ => return Err(CacheError::NotProtected { addr }),
        };
        if recorded != C::ID {
            return Err(self.type_mismatch::<C>(addr, recorded));
        }
        if mode == AccessMode::Read && flags.contains(UnprotectFlags::DIRTIED) {
            return Err(CacheError::InvalidArgument(format!(
                "entry at {addr:#x} was protected read-only and cannot be dirtied"
            )));
        }

        if flags.contains(UnprotectFlags::DELETED) {
            ty.clear(&mut payload)?;
            if let Some(record) = self.index.remove(&addr) {
                self.protected.remove(&addr);
                self.total_size -= record.size;
                if record.dirty {
                    self.dirty_size -= record.size;
                }
            }
            self.counters(C::ID).deletions += 1;
            self.observe();
            debug!(
                target: "rustyhdf5::cache",
                addr = format_args!("{addr:#x}"),
                kind = C::NAME,
                "entry deleted"
            );
            return Ok(Some(payload));
        }

        *payload.cache_info_mut() = CacheInfo::new(addr, C::ID);
        let new_size = ty.size(io, &payload);
        let idx = self.lru.push_back(addr);
        self.protected.remove(&addr);
        if let Some(record) = self.index.get_mut(&addr) {
            let was_dirty = record.dirty;
            record.dirty |= flags.contains(UnprotectFlags::DIRTIED);
            self.total_size = self.total_size - record.size + new_size;
            if was_dirty {
                self.dirty_size -= record.size;
            }
            if record.dirty {
                self.dirty_size += new_size;
            }
            record.size = new_size;
            record.payload = Some(Box::new(payload));
            record.state = Residency::Unprotected(idx);
        }
        self.observe();
        Ok(None)
    }

    /// Move the entry at `old` to `new`, keeping its state and size.
    pub fn rename_entry<C: EntryType>(&mut self, _ty: &C, old: Addr, new: Addr) -> Result<()> {
        check_addr(new)?;
        let recorded = match self.index.get(&old) {
            Some(record) => record.type_id,
            None => return Err(CacheError::NotFound { addr: old }),
        };
        if recorded != C::ID {
            return Err(self.type_mismatch::<C>(old, recorded));
        }
        if old == new {
            return Ok(());
        }
        if self.index.contains_key(&new) {
            return Err(CacheError::DuplicateAddress { addr: new });
        }
        let handle = self.types.handle_for::<C>()?.clone();

        let Some(mut record) = self.index.remove(&old) else {
            return Err(CacheError::NotFound { addr: old });
        };
        match record.state {
            Residency::Unprotected(idx) => {
                if let Some(slot) = self.lru.get_mut(idx) {
                    *slot = new;
                }
            }
            Residency::Protected(_) => {
                self.protected.remove(&old);
                self.protected.insert(new);
            }
        }
        if let Some(payload) = record.payload.as_mut() {
            handle.stamp(&mut **payload, new)?;
        }
        self.index.insert(new, record);
        self.counters(C::ID).renames += 1;

        debug!(
            target: "rustyhdf5::cache",
            old = format_args!("{old:#x}"),
            new = format_args!("{new:#x}"),
            kind = C::NAME,
            "entry renamed"
        );
        Ok(())
    }

    // ── Flushing and teardown ────────────────────────────────────────────

    /// Write every unprotected dirty entry, in ascending address order.
    ///
    /// Entries the write-permission policy refuses are skipped and stay
    /// dirty. A failing `flush` callback does not stop the pass; the first
    /// failure is reported as `FlushFailed` at the end. With
    /// [`FlushFlags::INVALIDATE`] every clean entry is evicted afterwards,
    /// unless an entry is protected, in which case nothing is evicted and
    /// `ProtectedEntriesRemain` is returned.
    pub fn flush_cache(
        &mut self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        flags: FlushFlags,
    ) -> Result<()> {
        let invalidate = flags.contains(FlushFlags::INVALIDATE);
        let clear_only = flags.contains(FlushFlags::CLEAR_ONLY);
        let destroy = invalidate && self.protected.is_empty();

        let mut targets: Vec<Addr> = self
            .index
            .iter()
            .filter(|(_, r)| r.dirty && !r.is_protected())
            .map(|(&addr, _)| addr)
            .collect();
        targets.sort_unstable();

        let mut failed = 0usize;
        let mut first_failure: Option<(Addr, String)> = None;
        let mut denied = 0usize;
        for addr in targets {
            let outcome = if clear_only {
                self.clear_entry(addr).map(|()| WriteBack::Written)
            } else {
                self.write_back(io, ctx, addr, destroy)
            };
            match outcome {
                Ok(WriteBack::Written) => {}
                Ok(WriteBack::Denied) => denied += 1,
                Err(e) => {
                    failed += 1;
                    first_failure.get_or_insert((addr, e.to_string()));
                }
            }
        }

        if invalidate {
            if !self.protected.is_empty() {
                let count = self.protected.len();
                warn!(
                    target: "rustyhdf5::cache",
                    count,
                    "invalidating flush refused: protected entries remain"
                );
                return Err(CacheError::ProtectedEntriesRemain { count });
            }
            self.evict_all_clean();
        }

        if let Some((first, reason)) = first_failure {
            return Err(CacheError::FlushFailed {
                failed,
                first,
                reason,
            });
        }
        if invalidate && !self.index.is_empty() {
            warn!(
                target: "rustyhdf5::cache",
                remaining = self.index.len(),
                denied,
                "dirty entries left after invalidating flush"
            );
            return Err(CacheError::DirtyEntriesRemain {
                count: self.index.len(),
            });
        }
        Ok(())
    }

    /// Flush and evict everything, leaving the cache empty.
    ///
    /// Refuses without touching anything while an entry is protected.
    pub fn dest(&mut self, io: &mut dyn MetadataIo, ctx: &TransferContext) -> Result<()> {
        if !self.protected.is_empty() {
            let count = self.protected.len();
            warn!(
                target: "rustyhdf5::cache",
                count,
                first = ?self.protected.iter().next(),
                "cache destroy refused: protected entries remain"
            );
            return Err(CacheError::ProtectedEntriesRemain { count });
        }
        self.flush_cache(io, ctx, FlushFlags::INVALIDATE)?;
        debug_assert!(self.lru.is_empty());
        self.lru.clear();
        self.index.shrink_to_fit();
        info!(
            target: "rustyhdf5::cache",
            peak_size = self.stats.peak_size,
            peak_entries = self.stats.peak_entries,
            "cache destroyed"
        );
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Statistics snapshot.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Zero the statistics counters.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Apply a new configuration, evicting if the new budget is exceeded.
    pub fn set_config(
        &mut self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        config: CacheConfig,
    ) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.make_space(io, ctx, 0);
        Ok(())
    }

    /// The registered entry types.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn entry_status(&self, addr: Addr) -> Option<EntryStatus> {
        self.index.get(&addr).map(|r| EntryStatus {
            type_id: r.type_id,
            size: r.size,
            is_dirty: r.dirty,
            is_protected: r.is_protected(),
        })
    }

    /// Whether an entry resides at `addr`.
    pub fn contains(&self, addr: Addr) -> bool {
        self.index.contains_key(&addr)
    }

    /// Number of resident entries, protected ones included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of the sizes of all resident entries.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn dirty_size(&self) -> usize {
        self.dirty_size
    }

    pub fn clean_size(&self) -> usize {
        self.total_size - self.dirty_size
    }

    pub fn protected_count(&self) -> usize {
        self.protected.len()
    }

    /// Addresses of all resident entries, ascending.
    pub fn resident_addresses(&self) -> Vec<Addr> {
        let mut addrs: Vec<Addr> = self.index.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Unprotected entries from least to most recently used.
    pub fn lru_addresses(&self) -> Vec<Addr> {
        self.lru.iter().map(|(_, &addr)| addr).collect()
    }

    // ── Replacement ──────────────────────────────────────────────────────

    /// Evict from the LRU head until `incoming` more bytes fit under
    /// `max_size`, then top up the clean reserve.
    fn make_space(&mut self, io: &mut dyn MetadataIo, ctx: &TransferContext, incoming: usize) {
        if !self.config.evictions_enabled
            || self.total_size + incoming <= self.config.max_size
        {
            return;
        }

        let mut cursor = self.lru.head();
        while self.total_size + incoming > self.config.max_size {
            let Some(idx) = cursor else { break };
            cursor = self.lru.next(idx);
            let Some(&addr) = self.lru.get(idx) else { break };
            let Some(record) = self.index.get(&addr) else { continue };
            debug_assert!(!record.is_protected(), "protected entry on the LRU list");

            if !record.dirty {
                self.evict(addr);
            } else if self.config.flush_before_evict {
                if let Ok(WriteBack::Written) = self.write_back(io, ctx, addr, true) {
                    self.evict(addr);
                }
            }
        }

        if self.total_size + incoming > self.config.max_size {
            debug!(
                target: "rustyhdf5::cache",
                total = self.total_size,
                incoming,
                max = self.config.max_size,
                "cache over budget after eviction scan"
            );
        }

        if self.config.flush_before_evict {
            self.maintain_clean_reserve(io, ctx);
        }
    }

    /// Flush dirty entries from the LRU head, without evicting them, until
    /// the clean bytes on the list reach `min_clean_size`.
    fn maintain_clean_reserve(&mut self, io: &mut dyn MetadataIo, ctx: &TransferContext) {
        let mut clean: usize = self
            .lru
            .iter()
            .filter_map(|(_, addr)| self.index.get(addr))
            .filter(|r| !r.dirty)
            .map(|r| r.size)
            .sum();
        if clean >= self.config.min_clean_size {
            return;
        }

        let dirty: Vec<(Addr, usize)> = self
            .lru
            .iter()
            .filter_map(|(_, &addr)| self.index.get(&addr).map(|r| (addr, r)))
            .filter(|(_, r)| r.dirty)
            .map(|(addr, r)| (addr, r.size))
            .collect();
        for (addr, size) in dirty {
            if clean >= self.config.min_clean_size {
                break;
            }
            if let Ok(WriteBack::Written) = self.write_back(io, ctx, addr, false) {
                clean += size;
            }
        }
    }

    /// Consult the policy, then write one unprotected dirty entry.
    fn write_back(
        &mut self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        addr: Addr,
        destroy: bool,
    ) -> Result<WriteBack> {
        let Some(type_id) = self.index.get(&addr).map(|r| r.type_id) else {
            return Err(CacheError::NotFound { addr });
        };

        if !self.policy.check_write_permitted(&*io, ctx) {
            self.counters(type_id).write_denials += 1;
            debug!(
                target: "rustyhdf5::cache",
                addr = format_args!("{addr:#x}"),
                dxpl = ctx.label_str(),
                "write not permitted, entry left dirty"
            );
            return Ok(WriteBack::Denied);
        }

        let handle = self
            .types
            .get(type_id)
            .cloned()
            .ok_or_else(|| CacheError::InvalidArgument(format!("entry type {type_id} is not registered")))?;
        let Some(record) = self.index.get_mut(&addr) else {
            return Err(CacheError::NotFound { addr });
        };
        let Some(payload) = record.payload.as_mut() else {
            return Err(CacheError::AlreadyProtected { addr });
        };

        match handle.flush(io, ctx, addr, &mut **payload, destroy) {
            Ok(()) => {
                if record.dirty {
                    record.dirty = false;
                    self.dirty_size -= record.size;
                }
                self.counters(type_id).flushes += 1;
                debug!(
                    target: "rustyhdf5::cache",
                    addr = format_args!("{addr:#x}"),
                    kind = handle.name(),
                    destroy,
                    "entry flushed"
                );
                Ok(WriteBack::Written)
            }
            Err(e) => {
                self.counters(type_id).flush_failures += 1;
                warn!(
                    target: "rustyhdf5::cache",
                    addr = format_args!("{addr:#x}"),
                    kind = handle.name(),
                    error = %e,
                    "flush failed, entry left dirty"
                );
                Err(e)
            }
        }
    }

    /// Mark one unprotected dirty entry clean without writing it.
    fn clear_entry(&mut self, addr: Addr) -> Result<()> {
        let Some(type_id) = self.index.get(&addr).map(|r| r.type_id) else {
            return Err(CacheError::NotFound { addr });
        };
        let handle = self
            .types
            .get(type_id)
            .cloned()
            .ok_or_else(|| CacheError::InvalidArgument(format!("entry type {type_id} is not registered")))?;
        let Some(record) = self.index.get_mut(&addr) else {
            return Err(CacheError::NotFound { addr });
        };
        let Some(payload) = record.payload.as_mut() else {
            return Err(CacheError::AlreadyProtected { addr });
        };
        handle.clear(&mut **payload)?;
        if record.dirty {
            record.dirty = false;
            self.dirty_size -= record.size;
        }
        self.counters(type_id).clears += 1;
        Ok(())
    }

    /// Drop one clean unprotected entry.
    fn evict(&mut self, addr: Addr) {
        let Some(record) = self.index.get(&addr) else { return };
        debug_assert!(!record.is_protected(), "eviction candidate {addr:#x} is protected");
        let Residency::Unprotected(idx) = record.state else { return };
        if record.dirty {
            return;
        }
        let type_id = record.type_id;
        let size = record.size;
        self.index.remove(&addr);
        self.lru.remove(idx);
        self.total_size -= size;
        self.counters(type_id).evictions += 1;
        self.observe();
        debug!(
            target: "rustyhdf5::cache",
            addr = format_args!("{addr:#x}"),
            size,
            "entry evicted"
        );
    }

    fn evict_all_clean(&mut self) {
        let clean: Vec<Addr> = self
            .lru
            .iter()
            .map(|(_, &addr)| addr)
            .filter(|addr| self.index.get(addr).is_some_and(|r| !r.dirty))
            .collect();
        for addr in clean {
            self.evict(addr);
        }
    }

    // ── Bookkeeping ──────────────────────────────────────────────────────

    fn counters(&mut self, id: EntryTypeId) -> &mut TypeStats {
        let name = self.types.name(id).unwrap_or("unregistered");
        self.stats.type_mut(id.0, name)
    }

    fn observe(&mut self) {
        self.stats.observe(self.total_size, self.index.len());
    }

    fn type_mismatch<C: EntryType>(&self, addr: Addr, recorded: EntryTypeId) -> CacheError {
        CacheError::TypeMismatch {
            addr,
            recorded: self.types.name(recorded).unwrap_or("unregistered"),
            requested: C::NAME,
        }
    }
}

fn check_addr(addr: Addr) -> Result<()> {
    if addr == UNDEFINED_ADDR {
        return Err(CacheError::InvalidArgument(
            "undefined address".to_string(),
        ));
    }
    Ok(())
}

impl core::fmt::Debug for Cache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("types", &self.types)
            .field("entries", &self.index.len())
            .field("lru", &self.lru.len())
            .field("protected", &self.protected.len())
            .field("total_size", &self.total_size)
            .field("dirty_size", &self.dirty_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFile;
    use crate::policy::{AlwaysPermitted, NeverPermitted};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Block {
        info: CacheInfo,
        value: u8,
        len: usize,
    }

    impl Cacheable for Block {
        fn cache_info(&self) -> &CacheInfo {
            &self.info
        }
        fn cache_info_mut(&mut self) -> &mut CacheInfo {
            &mut self.info
        }
    }

    fn block(value: u8, len: usize) -> Block {
        Block {
            info: CacheInfo::default(),
            value,
            len,
        }
    }

    /// Stores `len` copies of `value`; a zero first byte means "no object".
    #[derive(Default)]
    struct BlockType {
        flushes: Arc<AtomicUsize>,
    }

    impl EntryType for BlockType {
        type Payload = Block;
        type UserData = usize;
        const ID: EntryTypeId = EntryTypeId(7);
        const NAME: &'static str = "block";

        fn load(
            &self,
            io: &mut dyn MetadataIo,
            _ctx: &TransferContext,
            addr: Addr,
            len: &usize,
        ) -> Result<Block> {
            let bytes = io
                .read_vec(addr, *len)
                .map_err(|_| CacheError::NotFound { addr })?;
            if bytes[0] == 0 {
                return Err(CacheError::NotFound { addr });
            }
            Ok(block(bytes[0], *len))
        }

        fn flush(
            &self,
            io: &mut dyn MetadataIo,
            _ctx: &TransferContext,
            addr: Addr,
            payload: &mut Block,
            _destroy: bool,
        ) -> Result<()> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            io.write_at(addr, &vec![payload.value; payload.len])?;
            Ok(())
        }

        fn size(&self, _io: &dyn MetadataIo, payload: &Block) -> usize {
            payload.len
        }
    }

    fn cache_with(
        config: CacheConfig,
        policy: impl WritePermissionPolicy + 'static,
    ) -> (Cache, Arc<AtomicUsize>) {
        let ty = BlockType::default();
        let flushes = ty.flushes.clone();
        let types = TypeRegistry::new().with(ty).unwrap();
        (Cache::new(config, types, policy).unwrap(), flushes)
    }

    fn small_config() -> CacheConfig {
        CacheConfig::new().max_size(1024).min_clean_size(0)
    }

    fn put(cache: &mut Cache, io: &mut MemoryFile, addr: Addr, value: u8, len: usize) {
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        let p = cache
            .insert_entry(io, &ctx, &ty, addr, block(value, len))
            .unwrap();
        cache
            .unprotect(io, &ty, addr, p, UnprotectFlags::DIRTIED)
            .unwrap();
    }

    #[test]
    fn insert_stamps_and_protects() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        let p = cache
            .insert_entry(&mut io, &ctx, &ty, 0x100, block(1, 16))
            .unwrap();
        assert_eq!(p.info, CacheInfo::new(0x100, EntryTypeId(7)));
        let status = cache.entry_status(0x100).unwrap();
        assert!(status.is_protected);
        assert!(!status.is_dirty);
        assert_eq!(cache.total_size(), 16);
        assert_eq!(
            cache.insert_entry(&mut io, &ctx, &ty, 0x100, block(2, 16)),
            Err(CacheError::DuplicateAddress { addr: 0x100 })
        );
        assert!(matches!(
            cache.insert_entry(&mut io, &ctx, &ty, UNDEFINED_ADDR, block(2, 16)),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn protect_hit_moves_payload_out() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        put(&mut cache, &mut io, 0x40, 9, 8);
        assert_eq!(cache.lru_addresses(), vec![0x40]);

        let p = cache
            .protect(&mut io, &ctx, &ty, 0x40, &8, AccessMode::Write)
            .unwrap();
        assert_eq!(p.value, 9);
        assert!(cache.lru_addresses().is_empty());
        assert_eq!(
            cache.protect(&mut io, &ctx, &ty, 0x40, &8, AccessMode::Write),
            Err(CacheError::AlreadyProtected { addr: 0x40 })
        );
        assert_eq!(cache.stats().totals().hits, 1);
        cache
            .unprotect(&io, &ty, 0x40, p, UnprotectFlags::empty())
            .unwrap();
        assert!(cache.entry_status(0x40).unwrap().is_dirty);
    }

    #[test]
    fn protect_miss_loads() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::from_bytes(vec![5; 64]);
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        let p = cache
            .protect(&mut io, &ctx, &ty, 0x10, &4, AccessMode::Read)
            .unwrap();
        assert_eq!(p.value, 5);
        assert_eq!(p.info.addr, 0x10);
        assert_eq!(cache.stats().totals().misses, 1);
        assert!(matches!(
            cache.unprotect(&io, &ty, 0x10, p.clone(), UnprotectFlags::DIRTIED),
            Err(CacheError::InvalidArgument(_))
        ));
        cache
            .unprotect(&io, &ty, 0x10, p, UnprotectFlags::empty())
            .unwrap();
        assert_eq!(
            cache.protect(&mut io, &ctx, &ty, 0x100, &4, AccessMode::Read),
            Err(CacheError::NotFound { addr: 0x100 })
        );
        assert!(!cache.contains(0x100));
    }

    #[test]
    fn unprotect_errors_leave_state_alone() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ty = BlockType::default();
        assert_eq!(
            cache.unprotect(&io, &ty, 0x20, block(1, 1), UnprotectFlags::empty()),
            Err(CacheError::NotProtected { addr: 0x20 })
        );
        put(&mut cache, &mut io, 0x20, 1, 4);
        assert_eq!(
            cache.unprotect(&io, &ty, 0x20, block(1, 1), UnprotectFlags::empty()),
            Err(CacheError::NotProtected { addr: 0x20 })
        );
        assert_eq!(cache.total_size(), 4);
        assert_eq!(cache.lru_addresses(), vec![0x20]);
    }

    #[test]
    fn deleted_entries_are_never_flushed() {
        let (mut cache, flushes) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        let p = cache
            .insert_entry(&mut io, &ctx, &ty, 0x80, block(3, 32))
            .unwrap();
        let back = cache
            .unprotect(&io, &ty, 0x80, p, UnprotectFlags::DELETED | UnprotectFlags::DIRTIED)
            .unwrap();
        assert_eq!(back.unwrap().value, 3);
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::empty())
            .unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn flush_writes_in_address_order_and_cleans() {
        let (mut cache, flushes) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        put(&mut cache, &mut io, 0x30, 3, 4);
        put(&mut cache, &mut io, 0x10, 1, 4);
        assert_eq!(cache.dirty_size(), 8);
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::empty())
            .unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 2);
        assert_eq!(cache.dirty_size(), 0);
        assert_eq!(cache.clean_size(), 8);
        assert_eq!(io.read_vec(0x10, 4).unwrap(), vec![1; 4]);
        assert_eq!(io.read_vec(0x30, 4).unwrap(), vec![3; 4]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn denied_writes_are_skipped() {
        let (mut cache, flushes) = cache_with(small_config(), NeverPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        put(&mut cache, &mut io, 0x10, 1, 4);
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::empty())
            .unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
        assert!(cache.entry_status(0x10).unwrap().is_dirty);
        assert_eq!(cache.stats().totals().write_denials, 1);
        assert_eq!(
            cache.flush_cache(&mut io, &ctx, FlushFlags::INVALIDATE),
            Err(CacheError::DirtyEntriesRemain { count: 1 })
        );
        assert!(cache.contains(0x10));
    }

    #[test]
    fn clear_only_never_writes() {
        let (mut cache, flushes) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        put(&mut cache, &mut io, 0x10, 1, 4);
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::CLEAR_ONLY)
            .unwrap();
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
        assert_eq!(cache.dirty_size(), 0);
        assert!(io.is_empty());
        assert_eq!(cache.stats().totals().clears, 1);
    }

    #[test]
    fn eviction_prefers_clean_lru_entries() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        put(&mut cache, &mut io, 0x000, 1, 400);
        put(&mut cache, &mut io, 0x200, 2, 400);
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::empty())
            .unwrap();
        put(&mut cache, &mut io, 0x400, 3, 400);
        // 0x000 was the clean LRU head and made room.
        assert!(!cache.contains(0x000));
        assert_eq!(cache.resident_addresses(), vec![0x200, 0x400]);
        assert_eq!(cache.total_size(), 800);
        assert_eq!(cache.stats().totals().evictions, 1);
    }

    #[test]
    fn dirty_entries_block_eviction_without_flush_before_evict() {
        let (mut cache, flushes) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        put(&mut cache, &mut io, 0x000, 1, 600);
        put(&mut cache, &mut io, 0x400, 2, 600);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.total_size(), 1200);
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn flush_before_evict_writes_then_evicts() {
        let config = small_config().flush_before_evict(true);
        let (mut cache, flushes) = cache_with(config, AlwaysPermitted);
        let mut io = MemoryFile::new();
        put(&mut cache, &mut io, 0x000, 1, 600);
        put(&mut cache, &mut io, 0x400, 2, 600);
        assert_eq!(flushes.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resident_addresses(), vec![0x400]);
        assert_eq!(io.read_vec(0, 600).unwrap(), vec![1; 600]);
    }

    #[test]
    fn clean_reserve_is_topped_up() {
        let config = small_config().min_clean_size(512).flush_before_evict(true);
        let (mut cache, flushes) = cache_with(config, AlwaysPermitted);
        let mut io = MemoryFile::new();
        put(&mut cache, &mut io, 0x000, 1, 300);
        put(&mut cache, &mut io, 0x200, 2, 300);
        put(&mut cache, &mut io, 0x400, 3, 300);
        put(&mut cache, &mut io, 0x600, 4, 300);
        // 0x000 was flushed and evicted; 0x200 and 0x400 were flushed to
        // rebuild the clean reserve.
        assert!(!cache.contains(0x000));
        assert_eq!(flushes.load(Ordering::SeqCst), 3);
        assert!(cache.clean_size() >= 512);
        assert!(cache.entry_status(0x600).unwrap().is_dirty);
    }

    #[test]
    fn evictions_can_be_disabled() {
        let config = small_config().evictions_enabled(false);
        let (mut cache, _) = cache_with(config, AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        for i in 0..4u64 {
            put(&mut cache, &mut io, i * 0x400, 1, 400);
        }
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::empty())
            .unwrap();
        put(&mut cache, &mut io, 0x1000, 1, 400);
        assert_eq!(cache.len(), 5);
        assert_eq!(cache.total_size(), 2000);
    }

    #[test]
    fn rename_rekeys_and_restamps() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        put(&mut cache, &mut io, 0x10, 4, 8);
        put(&mut cache, &mut io, 0x20, 5, 8);
        assert_eq!(
            cache.rename_entry(&ty, 0x10, 0x20),
            Err(CacheError::DuplicateAddress { addr: 0x20 })
        );
        assert_eq!(
            cache.rename_entry(&ty, 0x99, 0x100),
            Err(CacheError::NotFound { addr: 0x99 })
        );
        cache.rename_entry(&ty, 0x10, 0x10).unwrap();
        cache.rename_entry(&ty, 0x10, 0x30).unwrap();
        assert_eq!(cache.resident_addresses(), vec![0x20, 0x30]);
        assert_eq!(cache.lru_addresses(), vec![0x30, 0x20]);
        let p = cache
            .protect(&mut io, &ctx, &ty, 0x30, &8, AccessMode::Read)
            .unwrap();
        assert_eq!(p.value, 4);
        assert_eq!(p.info.addr, 0x30);
        assert!(cache.entry_status(0x30).unwrap().is_dirty);
        assert_eq!(cache.total_size(), 16);
    }

    #[test]
    fn rename_of_protected_entry_follows_the_holder() {
        let (mut cache, _) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        let p = cache
            .insert_entry(&mut io, &ctx, &ty, 0x10, block(1, 4))
            .unwrap();
        cache.rename_entry(&ty, 0x10, 0x50).unwrap();
        assert_eq!(
            cache.unprotect(&io, &ty, 0x10, p.clone(), UnprotectFlags::empty()),
            Err(CacheError::NotProtected { addr: 0x10 })
        );
        cache
            .unprotect(&io, &ty, 0x50, p, UnprotectFlags::empty())
            .unwrap();
        assert_eq!(cache.protected_count(), 0);
    }

    #[test]
    fn dest_is_fail_closed() {
        let (mut cache, flushes) = cache_with(small_config(), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        let ty = BlockType::default();
        put(&mut cache, &mut io, 0x10, 1, 4);
        let p = cache
            .insert_entry(&mut io, &ctx, &ty, 0x20, block(2, 4))
            .unwrap();
        assert_eq!(
            cache.dest(&mut io, &ctx),
            Err(CacheError::ProtectedEntriesRemain { count: 1 })
        );
        assert_eq!(flushes.load(Ordering::SeqCst), 0);
        assert_eq!(cache.len(), 2);
        cache
            .unprotect(&io, &ty, 0x20, p, UnprotectFlags::DIRTIED)
            .unwrap();
        cache.dest(&mut io, &ctx).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.total_size(), 0);
        assert_eq!(flushes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_config_shrinks() {
        let (mut cache, _) = cache_with(small_config().max_size(4096), AlwaysPermitted);
        let mut io = MemoryFile::new();
        let ctx = TransferContext::new();
        for i in 0..4u64 {
            put(&mut cache, &mut io, i * 0x400, 1, 1000);
        }
        cache
            .flush_cache(&mut io, &ctx, FlushFlags::empty())
            .unwrap();
        cache
            .set_config(&mut io, &ctx, small_config().max_size(2048))
            .unwrap();
        assert_eq!(cache.resident_addresses(), vec![0x800, 0xC00]);
        assert!(cache
            .set_config(&mut io, &ctx, small_config().max_size(1))
            .is_err());
    }
}
