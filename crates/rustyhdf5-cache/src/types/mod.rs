//! Built-in entry types for the file-level metadata the format crate knows
//! how to encode.

mod local_heap;
mod superblock;
mod symbol_node;

pub use local_heap::{LocalHeapEntry, LocalHeapType, FREE_LIST_NULL};
pub use superblock::{SuperblockEntry, SuperblockType};
pub use symbol_node::{SymbolNode, SymbolNodeParams, SymbolNodeType};

use crate::entry::Addr;
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::registry::TypeRegistry;

/// Registry holding the superblock, symbol table node and local heap types.
pub fn builtin_types() -> Result<TypeRegistry> {
    TypeRegistry::new()
        .with(SuperblockType)?
        .with(SymbolNodeType)?
        .with(LocalHeapType)
}

/// Read up to `max_len` bytes at `addr`, clipped to the end of storage.
///
/// `NotFound` when `addr` lies at or past the end.
fn read_block(io: &mut dyn MetadataIo, addr: Addr, max_len: usize) -> Result<Vec<u8>> {
    let available = io.len().checked_sub(addr).filter(|&n| n > 0);
    let Some(available) = available else {
        return Err(CacheError::NotFound { addr });
    };
    let len = max_len.min(usize::try_from(available).unwrap_or(usize::MAX));
    Ok(io.read_vec(addr, len)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryTypeId;
    use crate::io::MemoryFile;

    #[test]
    fn builtin_registry() {
        let reg = builtin_types().unwrap();
        assert_eq!(reg.name(EntryTypeId(0)), Some("superblock"));
        assert_eq!(reg.name(EntryTypeId(1)), Some("symbol table node"));
        assert_eq!(reg.name(EntryTypeId(2)), Some("local heap"));
    }

    #[test]
    fn read_block_clips_and_reports_missing() {
        let mut io = MemoryFile::from_bytes(vec![7; 10]);
        assert_eq!(read_block(&mut io, 4, 100).unwrap(), vec![7; 6]);
        assert_eq!(read_block(&mut io, 0, 3).unwrap(), vec![7; 3]);
        assert_eq!(
            read_block(&mut io, 10, 4),
            Err(CacheError::NotFound { addr: 10 })
        );
        assert_eq!(
            read_block(&mut io, 99, 4),
            Err(CacheError::NotFound { addr: 99 })
        );
    }
}
