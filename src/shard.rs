//! Shard resolution for stream keys.
//!
//! Keys are hashed with 32-bit MurmurHash3 (x86 variant, seed 0, UTF-8
//! bytes) and mapped onto `total` shards with jump consistent hashing.
//! Growing `total` by one moves only the keys that land on the new shard.

use crate::error::{Result, StreamError};

const SEED: u32 = 0;
const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

const JUMP_MULTIPLIER: u64 = 2_862_933_555_777_941_757;

fn mix_block(mut k: u32) -> u32 {
    k = k.wrapping_mul(C1);
    k = k.rotate_left(15);
    k.wrapping_mul(C2)
}

fn finalize(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// 32-bit MurmurHash3 of `key`.
pub fn hash(key: &str) -> u32 {
    let bytes = key.as_bytes();
    let mut h = SEED;

    let mut blocks = bytes.chunks_exact(4);
    for block in &mut blocks {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h ^= mix_block(k);
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k = tail
            .iter()
            .enumerate()
            .fold(0u32, |k, (i, byte)| k ^ (u32::from(*byte) << (8 * i)));
        h ^= mix_block(k);
    }

    // Length is mixed in modulo 2^32
    finalize(h ^ bytes.len() as u32)
}

/// Jump consistent hash of `hash` onto `0..total`.
pub fn resolve(hash: u32, total: usize) -> Result<usize> {
    if total == 0 {
        return Err(StreamError::invalid_argument(
            "total shard count must be at least 1",
        ));
    }

    let total = total as i64;
    let mut key = u64::from(hash);
    let mut bucket: i64 = -1;
    let mut next: i64 = 0;
    while next < total {
        bucket = next;
        key = key.wrapping_mul(JUMP_MULTIPLIER).wrapping_add(1);
        next = ((bucket + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }
    Ok(bucket as usize)
}

/// Shard index for `key` among `total` shards.
pub fn resolve_key(key: &str, total: usize) -> Result<usize> {
    resolve(hash(key), total)
}
