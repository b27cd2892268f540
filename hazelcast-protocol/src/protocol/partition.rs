//! Partition hashing for key-based routing.

/// Seed used by the cluster for partition hashes.
const PARTITION_HASH_SEED: u32 = 0x01000193;

/// Computes the partition hash of a serialized key.
///
/// Uses the MurmurHash3 x86 32-bit algorithm, as the cluster does.
pub fn compute_partition_hash(key: &[u8]) -> i32 {
    murmur_hash3_x86_32(key, PARTITION_HASH_SEED)
}

/// Maps a hash onto a partition index in `0..partition_count`.
///
/// Returns `None` while the partition count is still unknown (zero or
/// negative).
pub fn hash_to_index(hash: i32, partition_count: i32) -> Option<i32> {
    if partition_count <= 0 {
        return None;
    }
    if hash == i32::MIN {
        return Some(0);
    }
    Some(hash.abs() % partition_count)
}

/// Returns the partition owning `key`.
pub fn partition_id_for_key(key: &[u8], partition_count: i32) -> Option<i32> {
    hash_to_index(compute_partition_hash(key), partition_count)
}

fn mix_k1(k1: u32) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

fn murmur_hash3_x86_32(data: &[u8], seed: u32) -> i32 {
    let mut h1 = seed;
    let mut blocks = data.chunks_exact(4);

    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k1 = tail
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, byte)| acc ^ ((*byte as u32) << (8 * i)));
        h1 ^= mix_k1(k1);
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;

    h1 as i32
}
