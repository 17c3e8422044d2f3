//! Partition hash functions.
//!
//! Both functions are pure and independent of process state, so a key always
//! lands on the same partition for a given partition count.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashFunction {
    /// 31-polynomial string hash over UTF-16 code units, matching the JVM's
    /// `String.hashCode`. Keeps partition assignment compatible with producers
    /// written against that hash.
    #[default]
    Default,
    /// Kafka's murmur2, the same function the Java client's default
    /// partitioner applies to record keys.
    Murmur2,
}

impl HashFunction {
    /// Maps `key` onto `[0, partition_count)`.
    pub fn partition(&self, key: &str, partition_count: i32) -> i32 {
        if partition_count <= 1 {
            return 0;
        }
        match self {
            HashFunction::Default => (string_hash(key) % partition_count).abs(),
            HashFunction::Murmur2 => {
                ((murmur2(key.as_bytes()) & 0x7fff_ffff) % partition_count as u32) as i32
            }
        }
    }
}

fn string_hash(key: &str) -> i32 {
    key.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Kafka-compatible murmur2 (seed 0x9747b28c).
pub fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let len = data.len();
    let mut h: u32 = SEED ^ (len as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
