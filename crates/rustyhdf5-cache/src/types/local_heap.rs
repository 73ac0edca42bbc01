use rustyhdf5_format::local_heap::{read_heap_string, LocalHeap};

use crate::entry::{Addr, CacheInfo, Cacheable, EntryType, EntryTypeId};
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::transfer::TransferContext;

use super::read_block;

/// Free-list offset meaning "no free block".
pub const FREE_LIST_NULL: u64 = 1;

const ALIGNMENT: usize = 8;

/// A cached local heap: header and data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeapEntry {
    pub info: CacheInfo,
    pub header: LocalHeap,
    data: Vec<u8>,
}

impl LocalHeapEntry {
    /// A heap whose data segment, at `data_segment_address`, holds only the
    /// empty string at offset 0.
    pub fn new(data_segment_address: Addr) -> Self {
        Self {
            info: CacheInfo::default(),
            header: LocalHeap {
                data_segment_size: ALIGNMENT as u64,
                free_list_head_offset: FREE_LIST_NULL,
                data_segment_address,
            },
            data: vec![0; ALIGNMENT],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The null-terminated string at `offset` in the data segment.
    pub fn string_at(&self, offset: u64) -> Result<String> {
        Ok(read_heap_string(&self.data, offset)?)
    }

    /// Append `s` to the data segment, padded to 8 bytes, and return its
    /// offset.
    ///
    /// The segment grows; the caller relocates it on disk if the new size
    /// no longer fits the old allocation.
    pub fn insert_string(&mut self, s: &str) -> Result<u64> {
        if s.as_bytes().contains(&0) {
            return Err(CacheError::InvalidArgument(
                "heap strings cannot contain NUL".to_string(),
            ));
        }
        let offset = self.data.len();
        let padded = (s.len() + 1).div_ceil(ALIGNMENT) * ALIGNMENT;
        self.data.extend_from_slice(s.as_bytes());
        self.data.resize(offset + padded, 0);
        self.header.data_segment_size = self.data.len() as u64;
        Ok(offset as u64)
    }
}

impl Cacheable for LocalHeapEntry {
    fn cache_info(&self) -> &CacheInfo {
        &self.info
    }

    fn cache_info_mut(&mut self) -> &mut CacheInfo {
        &mut self.info
    }
}

/// Entry type for local heaps; `addr` is the header address.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalHeapType;

impl EntryType for LocalHeapType {
    type Payload = LocalHeapEntry;
    type UserData = ();

    const ID: EntryTypeId = EntryTypeId(2);
    const NAME: &'static str = "local heap";

    fn load(
        &self,
        io: &mut dyn MetadataIo,
        _ctx: &TransferContext,
        addr: Addr,
        _udata: &(),
    ) -> Result<LocalHeapEntry> {
        let (os, ls) = (io.offset_size(), io.length_size());
        let bytes = read_block(io, addr, LocalHeap::header_len(os, ls))?;
        let header = LocalHeap::parse(&bytes, 0, os, ls)?;
        let len = usize::try_from(header.data_segment_size).map_err(|_| {
            CacheError::InvalidArgument(format!(
                "local heap data segment of {} bytes",
                header.data_segment_size
            ))
        })?;
        let data = io.read_vec(header.data_segment_address, len)?;
        Ok(LocalHeapEntry {
            info: CacheInfo::default(),
            header,
            data,
        })
    }

    fn flush(
        &self,
        io: &mut dyn MetadataIo,
        _ctx: &TransferContext,
        addr: Addr,
        payload: &mut LocalHeapEntry,
        _destroy: bool,
    ) -> Result<()> {
        debug_assert_eq!(payload.header.data_segment_size, payload.data.len() as u64);
        let header = payload
            .header
            .encode_header(io.offset_size(), io.length_size())?;
        io.write_at(addr, &header)?;
        io.write_at(payload.header.data_segment_address, &payload.data)?;
        Ok(())
    }

    fn size(&self, io: &dyn MetadataIo, payload: &LocalHeapEntry) -> usize {
        LocalHeap::header_len(io.offset_size(), io.length_size()) + payload.data.len()
    }
}
