use rustyhdf5_format::superblock::DEFAULT_GROUP_LEAF_K;
use rustyhdf5_format::symbol_table::{SymbolTableEntry, SymbolTableNode};

use crate::entry::{Addr, CacheInfo, Cacheable, EntryType, EntryTypeId};
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::transfer::TransferContext;

use super::read_block;

/// What `load` needs to know about a symbol table node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolNodeParams {
    /// Group leaf node K from the superblock; a node holds up to `2K`
    /// entries.
    pub leaf_k: u16,
}

impl Default for SymbolNodeParams {
    fn default() -> Self {
        Self {
            leaf_k: DEFAULT_GROUP_LEAF_K,
        }
    }
}

/// A cached symbol table node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolNode {
    pub info: CacheInfo,
    pub node: SymbolTableNode,
    pub leaf_k: u16,
}

impl SymbolNode {
    /// An empty node with room for `2 * leaf_k` entries.
    pub fn new(leaf_k: u16) -> Self {
        Self {
            info: CacheInfo::default(),
            node: SymbolTableNode::default(),
            leaf_k,
        }
    }

    pub fn capacity(&self) -> usize {
        2 * self.leaf_k as usize
    }

    pub fn is_full(&self) -> bool {
        self.node.entries.len() >= self.capacity()
    }

    /// Append an entry. Fails with `InvalidArgument` when the node is full.
    pub fn push(&mut self, entry: SymbolTableEntry) -> Result<()> {
        if self.is_full() {
            return Err(CacheError::InvalidArgument(format!(
                "symbol table node holds at most {} entries",
                self.capacity()
            )));
        }
        self.node.entries.push(entry);
        Ok(())
    }
}

impl Cacheable for SymbolNode {
    fn cache_info(&self) -> &CacheInfo {
        &self.info
    }

    fn cache_info_mut(&mut self) -> &mut CacheInfo {
        &mut self.info
    }
}

/// Entry type for symbol table nodes (SNOD).
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolNodeType;

impl EntryType for SymbolNodeType {
    type Payload = SymbolNode;
    type UserData = SymbolNodeParams;

    const ID: EntryTypeId = EntryTypeId(1);
    const NAME: &'static str = "symbol table node";

    fn load(
        &self,
        io: &mut dyn MetadataIo,
        _ctx: &TransferContext,
        addr: Addr,
        params: &SymbolNodeParams,
    ) -> Result<SymbolNode> {
        let os = io.offset_size();
        let bytes = read_block(io, addr, SymbolTableNode::encoded_len(os, params.leaf_k))?;
        let node = SymbolTableNode::parse(&bytes, 0, os)?;
        Ok(SymbolNode {
            info: CacheInfo::default(),
            node,
            leaf_k: params.leaf_k,
        })
    }

    fn flush(
        &self,
        io: &mut dyn MetadataIo,
        _ctx: &TransferContext,
        addr: Addr,
        payload: &mut SymbolNode,
        _destroy: bool,
    ) -> Result<()> {
        let bytes = payload.node.encode(io.offset_size(), payload.leaf_k)?;
        io.write_at(addr, &bytes)?;
        Ok(())
    }

    fn size(&self, io: &dyn MetadataIo, payload: &SymbolNode) -> usize {
        SymbolTableNode::encoded_len(io.offset_size(), payload.leaf_k)
    }
}
