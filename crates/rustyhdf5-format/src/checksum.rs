//! Metadata checksum used by the driver information block.
//!
//! The checksum is an XOR fold: byte `i` of the input is XORed into byte
//! `i mod 4` of a four-byte accumulator, and the accumulator is read as a
//! little-endian `u32`. Readers and writers must agree on this exactly, so
//! the algorithm is kept byte-for-byte and the width is fixed.

/// Width of the checksum accumulator in bytes.
pub const CHECKSUM_SIZE: usize = 4;

/// Fold `data` into a [`CHECKSUM_SIZE`]-byte accumulator and return the raw
/// accumulator bytes.
pub fn xor_fold_bytes(data: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut acc = [0u8; CHECKSUM_SIZE];
    for (i, &b) in data.iter().enumerate() {
        acc[i % CHECKSUM_SIZE] ^= b;
    }
    acc
}

/// XOR-fold checksum of `data`, accumulator interpreted little-endian.
pub fn xor_fold(data: &[u8]) -> u32 {
    u32::from_le_bytes(xor_fold_bytes(data))
}
