//! Write-permission gate consulted before every individual flush attempt.
//!
//! In a multi-process setting only collective operations may write
//! metadata; the policy lets the cache keep dirty entries resident instead
//! of writing them from an independent call.

use crate::io::MetadataIo;
use crate::transfer::{TransferContext, TransferMode};

/// Decides whether the cache may write an entry right now.
///
/// A refusal is not an error: the entry stays dirty and resident.
pub trait WritePermissionPolicy: Send {
    fn check_write_permitted(&self, io: &dyn MetadataIo, ctx: &TransferContext) -> bool;
}

/// Every write is permitted. The default for single-process use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysPermitted;

impl WritePermissionPolicy for AlwaysPermitted {
    fn check_write_permitted(&self, _io: &dyn MetadataIo, _ctx: &TransferContext) -> bool {
        true
    }
}

/// Writes are permitted only from collective transfers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectiveOnly;

impl WritePermissionPolicy for CollectiveOnly {
    fn check_write_permitted(&self, _io: &dyn MetadataIo, ctx: &TransferContext) -> bool {
        ctx.mode == TransferMode::Collective
    }
}

/// No write is ever permitted (read-only replicas).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeverPermitted;

impl WritePermissionPolicy for NeverPermitted {
    fn check_write_permitted(&self, _io: &dyn MetadataIo, _ctx: &TransferContext) -> bool {
        false
    }
}

impl<F> WritePermissionPolicy for F
where
    F: Fn(&TransferContext) -> bool + Send,
{
    fn check_write_permitted(&self, _io: &dyn MetadataIo, ctx: &TransferContext) -> bool {
        self(ctx)
    }
}
