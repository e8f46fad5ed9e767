/*
 * This file is a part of kvd
*/

//! The one hashing primitive the whole server uses for `hash_code`
//! fields (`Entry::hash_code`, `ZNode::hash_code`): an FNV-1a variant,
//! widened to 64 bits. This is the exact recurrence
//! `examples/original_source/src/zset.cpp`'s `str_hash` uses (`h =
//! FNV_OFFSET; h = (h + byte) * FNV_PRIME` per byte), just carried in a
//! 64-bit accumulator so a single function serves both the main key
//! space and sorted-set member names instead of inventing a second
//! scheme for one of them.

const FNV_OFFSET: u64 = 0x811C9DC5;
const FNV_PRIME: u64 = 0x0100_0193;

/// Hash a byte string the way every `hash_code` field in this crate is
/// derived. Not a cryptographic hash, and not meant to be: it exists to
/// pick a bucket and to cheaply short-circuit equality checks during a
/// chain walk.
pub fn str_hash(data: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &byte in data {
        h = (h.wrapping_add(byte as u64)).wrapping_mul(FNV_PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_offset_basis() {
        assert_eq!(str_hash(b""), FNV_OFFSET);
    }

    #[test]
    fn deterministic_and_sensitive_to_every_byte() {
        assert_eq!(str_hash(b"hello"), str_hash(b"hello"));
        assert_ne!(str_hash(b"hello"), str_hash(b"hellp"));
        assert_ne!(str_hash(b"hello"), str_hash(b"hell"));
    }
}
