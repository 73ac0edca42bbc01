//! Type-erased table of the entry types a cache knows about.

use std::any::{Any, TypeId};
use std::sync::Arc;

use crate::entry::{Addr, Cacheable, EntryType, EntryTypeId};
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::transfer::TransferContext;

/// A payload with its concrete type erased.
pub(crate) type AnyPayload = dyn Any + Send;

/// Boxed payload as stored by the engine.
pub(crate) type ErasedPayload = Box<AnyPayload>;

/// Object-safe view of an [`EntryType`] used for write-back of entries whose
/// concrete type the caller does not name (flushes, evictions).
pub(crate) trait ErasedEntryType: Send + Sync {
    fn id(&self) -> EntryTypeId;
    fn name(&self) -> &'static str;
    fn descriptor_type(&self) -> TypeId;
    fn flush(
        &self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        addr: Addr,
        payload: &mut AnyPayload,
        destroy: bool,
    ) -> Result<()>;
    fn clear(&self, payload: &mut AnyPayload) -> Result<()>;
    fn stamp(&self, payload: &mut AnyPayload, addr: Addr) -> Result<()>;
}

struct Registered<C>(C);

impl<C: EntryType> Registered<C> {
    fn downcast<'a>(&self, payload: &'a mut AnyPayload) -> Result<&'a mut C::Payload> {
        payload.downcast_mut::<C::Payload>().ok_or_else(|| {
            CacheError::InvalidArgument(format!("payload is not a {} payload", C::NAME))
        })
    }
}

impl<C: EntryType> ErasedEntryType for Registered<C> {
    fn id(&self) -> EntryTypeId {
        C::ID
    }

    fn name(&self) -> &'static str {
        C::NAME
    }

    fn descriptor_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn flush(
        &self,
        io: &mut dyn MetadataIo,
        ctx: &TransferContext,
        addr: Addr,
        payload: &mut AnyPayload,
        destroy: bool,
    ) -> Result<()> {
        let payload = self.downcast(payload)?;
        self.0.flush(io, ctx, addr, payload, destroy)
    }

    fn clear(&self, payload: &mut AnyPayload) -> Result<()> {
        let payload = self.downcast(payload)?;
        self.0.clear(payload)
    }

    fn stamp(&self, payload: &mut AnyPayload, addr: Addr) -> Result<()> {
        let info = self.downcast(payload)?.cache_info_mut();
        info.addr = addr;
        info.type_id = Some(C::ID);
        Ok(())
    }
}

/// The entry types registered with one cache, indexed by their tag.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    slots: Vec<Option<Arc<dyn ErasedEntryType>>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry type. Tags must be unique.
    pub fn register<C: EntryType>(&mut self, ty: C) -> Result<()> {
        let slot = C::ID.0 as usize;
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        if let Some(existing) = &self.slots[slot] {
            return Err(CacheError::InvalidArgument(format!(
                "entry type tag {} already registered to {}",
                C::ID,
                existing.name()
            )));
        }
        self.slots[slot] = Some(Arc::new(Registered(ty)));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<C: EntryType>(mut self, ty: C) -> Result<Self> {
        self.register(ty)?;
        Ok(self)
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EntryTypeId) -> bool {
        self.get(id).is_some()
    }

    /// Diagnostic name of a registered type.
    pub fn name(&self, id: EntryTypeId) -> Option<&'static str> {
        self.get(id).map(|t| t.name())
    }

    /// Iterate `(tag, name)` pairs in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryTypeId, &'static str)> + '_ {
        self.slots.iter().flatten().map(|t| (t.id(), t.name()))
    }

    pub(crate) fn get(&self, id: EntryTypeId) -> Option<&Arc<dyn ErasedEntryType>> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    /// Handle for `C`, checking that the tag is registered to `C` itself.
    pub(crate) fn handle_for<C: EntryType>(&self) -> Result<&Arc<dyn ErasedEntryType>> {
        let handle = self.get(C::ID).ok_or_else(|| {
            CacheError::InvalidArgument(format!(
                "entry type {} ({}) is not registered",
                C::NAME,
                C::ID
            ))
        })?;
        if handle.descriptor_type() != TypeId::of::<C>() {
            return Err(CacheError::InvalidArgument(format!(
                "entry type tag {} is registered to {}, not {}",
                C::ID,
                handle.name(),
                C::NAME
            )));
        }
        Ok(handle)
    }
}

impl core::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter().map(|(id, name)| (id.0, name))).finish()
    }
}
