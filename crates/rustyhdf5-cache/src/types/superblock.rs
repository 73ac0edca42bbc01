use rustyhdf5_format::superblock::{DriverInfo, Superblock};

use crate::entry::{Addr, CacheInfo, Cacheable, EntryType, EntryTypeId};
use crate::error::{CacheError, Result};
use crate::io::MetadataIo;
use crate::transfer::TransferContext;

use super::read_block;

/// Upper bound on an encoded v0/v1 superblock with 8-byte addresses.
const MAX_SUPERBLOCK_LEN: usize = 128;
/// Driver information block bytes before the driver payload.
const DRIVER_INFO_HEADER_LEN: usize = 16;

/// The file superblock plus its optional driver information block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperblockEntry {
    pub info: CacheInfo,
    pub superblock: Superblock,
    pub driver_info: Option<DriverInfo>,
}

impl SuperblockEntry {
    pub fn new(superblock: Superblock, driver_info: Option<DriverInfo>) -> Self {
        Self {
            info: CacheInfo::default(),
            superblock,
            driver_info,
        }
    }

    /// Absolute address of the driver information block, if any.
    pub fn driver_info_location(&self) -> Option<Addr> {
        self.superblock.has_driver_info().then(|| {
            self.superblock
                .base_address
                .wrapping_add(self.superblock.driver_info_address)
        })
    }
}

impl Cacheable for SuperblockEntry {
    fn cache_info(&self) -> &CacheInfo {
        &self.info
    }

    fn cache_info_mut(&mut self) -> &mut CacheInfo {
        &mut self.info
    }
}

/// Entry type for the superblock; `addr` is where the signature starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuperblockType;

impl EntryType for SuperblockType {
    type Payload = SuperblockEntry;
    type UserData = ();

    const ID: EntryTypeId = EntryTypeId(0);
    const NAME: &'static str = "superblock";

    fn load(
        &self,
        io: &mut dyn MetadataIo,
        _ctx: &TransferContext,
        addr: Addr,
        _udata: &(),
    ) -> Result<SuperblockEntry> {
        let bytes = read_block(io, addr, MAX_SUPERBLOCK_LEN)?;
        let superblock = Superblock::parse(&bytes, 0)?;

        let mut entry = SuperblockEntry::new(superblock, None);
        if let Some(at) = entry.driver_info_location() {
            let header = io.read_vec(at, DRIVER_INFO_HEADER_LEN)?;
            let info_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
            let total = info_len
                .saturating_add(DRIVER_INFO_HEADER_LEN + rustyhdf5_format::checksum::CHECKSUM_SIZE);
            let block = io.read_vec(at, total)?;
            entry.driver_info = Some(DriverInfo::parse(&block)?);
        }
        Ok(entry)
    }

    fn flush(
        &self,
        io: &mut dyn MetadataIo,
        _ctx: &TransferContext,
        addr: Addr,
        payload: &mut SuperblockEntry,
        _destroy: bool,
    ) -> Result<()> {
        io.write_at(addr, &payload.superblock.encode()?)?;
        if let Some(driver) = &payload.driver_info {
            let at = payload.driver_info_location().ok_or_else(|| {
                CacheError::InvalidArgument(
                    "driver information present but superblock has no driver info address"
                        .to_string(),
                )
            })?;
            io.write_at(at, &driver.encode())?;
        }
        Ok(())
    }

    fn size(&self, _io: &dyn MetadataIo, payload: &SuperblockEntry) -> usize {
        payload.superblock.encoded_len()
            + payload
                .driver_info
                .as_ref()
                .map_or(0, DriverInfo::encoded_len)
    }
}
