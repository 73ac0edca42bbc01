//! Property tests for the metadata codecs and the XOR-fold checksum.

use proptest::prelude::*;
use rustyhdf5_format::checksum::{xor_fold, xor_fold_bytes};
use rustyhdf5_format::local_heap::LocalHeap;
use rustyhdf5_format::superblock::{DriverInfo, Superblock};
use rustyhdf5_format::symbol_table::{SymbolTableEntry, SymbolTableNode};

// ---- Checksum ----

proptest! {
    #[test]
    fn checksum_of_concatenation_folds(a in prop::collection::vec(any::<u8>(), 0..64),
                                       b in prop::collection::vec(any::<u8>(), 0..64)) {
        // Folding is linear when the second half starts on a word boundary.
        let mut padded = a.clone();
        padded.resize(a.len().div_ceil(4) * 4, 0);
        let mut joined = padded.clone();
        joined.extend_from_slice(&b);
        prop_assert_eq!(xor_fold(&joined), xor_fold(&padded) ^ xor_fold(&b));
    }

    #[test]
    fn checksum_of_doubled_words_is_zero(words in prop::collection::vec(any::<[u8; 4]>(), 0..32)) {
        let mut data: Vec<u8> = words.iter().flatten().copied().collect();
        data.extend_from_within(..);
        prop_assert_eq!(xor_fold_bytes(&data), [0; 4]);
    }

    #[test]
    fn any_single_byte_flip_is_detected(info in prop::collection::vec(any::<u8>(), 0..48),
                                        flip in any::<prop::sample::Index>(),
                                        mask in 1u8..) {
        let block = DriverInfo { driver_id: *b"NCSAmult", info };
        let mut bytes = block.encode();
        let i = flip.index(bytes.len());
        bytes[i] ^= mask;
        prop_assert_ne!(DriverInfo::parse(&bytes), Ok(block));
    }
}

// ---- Parsers never panic ----

proptest! {
    #[test]
    fn superblock_parse_is_total(data in prop::collection::vec(any::<u8>(), 0..160)) {
        let _ = Superblock::parse(&data, 0);
    }

    #[test]
    fn node_parse_is_total(tail in prop::collection::vec(any::<u8>(), 0..200),
                           os in prop::sample::select(vec![2u8, 4, 8])) {
        let mut data = b"SNOD\x01\x00".to_vec();
        data.extend_from_slice(&tail);
        let _ = SymbolTableNode::parse(&data, 0, os);
    }

    #[test]
    fn heap_parse_is_total(tail in prop::collection::vec(any::<u8>(), 0..40)) {
        let mut data = b"HEAP\x00\x00\x00\x00".to_vec();
        data.extend_from_slice(&tail);
        let _ = LocalHeap::parse(&data, 0, 8, 8);
    }
}

// ---- Width-dependent encoding ----

fn entry(max: u64) -> impl Strategy<Value = SymbolTableEntry> {
    (0..max, 0..max, 0u32..3, any::<[u8; 16]>()).prop_map(
        |(link_name_offset, object_header_address, cache_type, scratch_pad)| SymbolTableEntry {
            link_name_offset,
            object_header_address,
            cache_type,
            scratch_pad,
        },
    )
}

proptest! {
    #[test]
    fn node_encoding_has_fixed_size(entries in prop::collection::vec(entry(0xFFFF), 0..8),
                                    os in prop::sample::select(vec![2u8, 4, 8])) {
        let node = SymbolTableNode { entries };
        let bytes = node.encode(os, 4).unwrap();
        prop_assert_eq!(bytes.len(), SymbolTableNode::encoded_len(os, 4));
        prop_assert_eq!(SymbolTableNode::parse(&bytes, 0, os).unwrap(), node);
    }

    #[test]
    fn superblock_is_byte_exact(eof in 0u64..u64::MAX, root in 0u64..u64::MAX, leaf_k in 1u16..64) {
        let mut sb = Superblock::new_v0(eof, root);
        sb.group_leaf_node_k = leaf_k;
        let bytes = sb.encode().unwrap();
        prop_assert_eq!(bytes.len(), sb.encoded_len());
        let parsed = Superblock::parse(&bytes, 0).unwrap();
        prop_assert_eq!(parsed.encode().unwrap(), bytes);
    }
}
