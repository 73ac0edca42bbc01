//! Storage adapters the entry types read from and write to.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Positional byte storage behind one HDF5 file.
///
/// The cache never calls this directly; it is handed to the entry types'
/// `load` and `flush` callbacks and to the write-permission policy.
pub trait MetadataIo {
    /// Fill `buf` from `addr`. Reading past the end is an error.
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write `data` at `addr`, growing the storage if needed.
    fn write_at(&mut self, addr: u64, data: &[u8]) -> io::Result<()>;

    /// Current size of the storage in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width in bytes of file addresses.
    fn offset_size(&self) -> u8 {
        8
    }

    /// Width in bytes of file lengths.
    fn length_size(&self) -> u8 {
        8
    }

    /// Read `len` bytes at `addr` into a fresh buffer.
    ///
    /// The range is checked against [`len`](Self::len) before anything is
    /// allocated, so a length read from a corrupt file fails cleanly.
    fn read_vec(&mut self, addr: u64, len: usize) -> io::Result<Vec<u8>> {
        let size = self.len();
        match addr.checked_add(len as u64) {
            Some(end) if end <= size => {}
            _ => return Err(out_of_range(addr, len, size)),
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        buf.resize(len, 0);
        self.read_at(addr, &mut buf)?;
        Ok(buf)
    }
}

fn out_of_range(addr: u64, len: usize, size: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("read of {len} bytes at {addr:#x} past end of storage ({size} bytes)"),
    )
}

/// Growable in-memory storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFile {
    data: Vec<u8>,
    offset_size: u8,
    length_size: u8,
}

impl MemoryFile {
    /// Empty storage with 8-byte addresses and lengths.
    pub fn new() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Wrap existing bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            offset_size: 8,
            length_size: 8,
        }
    }

    /// Override the address and length widths reported to the codecs.
    pub fn with_widths(mut self, offset_size: u8, length_size: u8) -> Self {
        self.offset_size = offset_size;
        self.length_size = length_size;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl MetadataIo for MemoryFile {
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        let size = self.data.len() as u64;
        let end = addr
            .checked_add(buf.len() as u64)
            .filter(|&end| end <= size)
            .ok_or_else(|| out_of_range(addr, buf.len(), size))?;
        buf.copy_from_slice(&self.data[addr as usize..end as usize]);
        Ok(())
    }

    fn write_at(&mut self, addr: u64, data: &[u8]) -> io::Result<()> {
        let end = addr
            .checked_add(data.len() as u64)
            .and_then(|e| usize::try_from(e).ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address overflow"))?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[addr as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn offset_size(&self) -> u8 {
        self.offset_size
    }

    fn length_size(&self) -> u8 {
        self.length_size
    }
}

/// Storage backed by a `std::fs::File`.
#[derive(Debug)]
pub struct StdFile {
    file: File,
    len: u64,
}

impl StdFile {
    /// Open an existing file for reading and writing.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file)
    }

    /// Create (or truncate) a file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_file(file)
    }

    /// Wrap an already open file.
    pub fn from_file(file: File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Flush OS buffers to disk.
    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn into_inner(self) -> File {
        self.file
    }
}

impl MetadataIo for StdFile {
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        match addr.checked_add(buf.len() as u64) {
            Some(end) if end <= self.len => {}
            _ => return Err(out_of_range(addr, buf.len(), self.len)),
        }
        self.file.seek(SeekFrom::Start(addr))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, addr: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(addr))?;
        self.file.write_all(data)?;
        self.len = self.len.max(addr + data.len() as u64);
        Ok(())
    }

    fn len(&self) -> u64 {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_file_grows_on_write() {
        let mut mem = MemoryFile::new();
        assert!(mem.is_empty());
        mem.write_at(4, b"abcd").unwrap();
        assert_eq!(mem.len(), 8);
        assert_eq!(mem.as_bytes(), b"\0\0\0\0abcd");
        mem.write_at(0, b"xy").unwrap();
        assert_eq!(mem.read_vec(0, 3).unwrap(), b"xy\0");
    }

    #[test]
    fn memory_file_rejects_short_reads() {
        let mut mem = MemoryFile::from_bytes(vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        let err = mem.read_at(0, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(mem.read_at(u64::MAX, &mut buf).is_err());
    }

    #[test]
    fn oversized_read_vec_fails_before_allocating() {
        let mut mem = MemoryFile::from_bytes(vec![0; 64]);
        let err = mem.read_vec(8, 1 << 62).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(mem.read_vec(u64::MAX, 2).is_err());
        assert_eq!(mem.read_vec(60, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn widths_are_configurable() {
        let mem = MemoryFile::new().with_widths(4, 2);
        assert_eq!(mem.offset_size(), 4);
        assert_eq!(mem.length_size(), 2);
        assert_eq!(MemoryFile::new().offset_size(), 8);
    }

    #[test]
    fn std_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.h5");
        {
            let mut f = StdFile::create(&path).unwrap();
            assert_eq!(f.len(), 0);
            f.write_at(16, b"HEAP").unwrap();
            assert_eq!(f.len(), 20);
            f.sync().unwrap();
        }
        let mut f = StdFile::open(&path).unwrap();
        assert_eq!(f.len(), 20);
        assert_eq!(f.read_vec(16, 4).unwrap(), b"HEAP");
        let mut buf = [0u8; 8];
        assert!(f.read_at(16, &mut buf).is_err());
    }
}
