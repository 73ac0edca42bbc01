//! HDF5 file signature (magic bytes) and where it may appear.

/// The 8-byte HDF5 magic signature.
pub const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1A, b'\n'];

/// First non-zero offset the signature may sit at.
const FIRST_USER_BLOCK: u64 = 512;

/// Offsets at which a superblock signature may start in a file of
/// `file_len` bytes: 0, then 512, 1024, 2048, ... while eight bytes still
/// fit.
pub fn signature_offsets(file_len: u64) -> impl Iterator<Item = u64> {
    let sig_len = HDF5_SIGNATURE.len() as u64;
    core::iter::once(0)
        .chain(core::iter::successors(Some(FIRST_USER_BLOCK), |&off| {
            off.checked_mul(2)
        }))
        .take_while(move |&off| off.checked_add(sig_len).is_some_and(|end| end <= file_len))
}

/// Whether `bytes` starts with the HDF5 signature.
pub fn is_signature(bytes: &[u8]) -> bool {
    bytes.len() >= HDF5_SIGNATURE.len() && bytes[..HDF5_SIGNATURE.len()] == HDF5_SIGNATURE
}
