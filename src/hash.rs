//! Stable hashing utilities for keys and buckets.
//!
//! Goals:
//! - Use a stable, explicit hash (not std::DefaultHasher) so the key -> bucket mapping
//!   survives toolchain/platform changes.
//! - Record the hash kind in the superblock; a file is always read with the hash it was
//!   written with.

use std::fmt;
use std::hash::Hasher;
use std::str::FromStr;

use twox_hash::{XxHash32, XxHash64};

/// Type of stable hash used by the store.
/// Stored as u32 in block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    /// 64-bit xxhash with seed=0. Default.
    Xx64Seed0 = 1,
    /// 32-bit xxhash with seed=0, widened to u64.
    Xx32Seed0 = 2,
}

impl HashKind {
    pub fn to_u32(self) -> u32 {
        self as u32
    }

    /// Parse from on-disk u32 code. Unknown codes return None.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(HashKind::Xx64Seed0),
            2 => Some(HashKind::Xx32Seed0),
            _ => None,
        }
    }
}

impl Default for HashKind {
    fn default() -> Self {
        HASH_KIND_DEFAULT
    }
}

impl fmt::Display for HashKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKind::Xx64Seed0 => write!(f, "xxhash64(seed=0)"),
            HashKind::Xx32Seed0 => write!(f, "xxhash32(seed=0)"),
        }
    }
}

impl FromStr for HashKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xx64" | "xxhash64" => Ok(HashKind::Xx64Seed0),
            "xx32" | "xxhash32" => Ok(HashKind::Xx32Seed0),
            other => Err(format!("unknown hash kind '{}'", other)),
        }
    }
}

/// Default hash kind for new stores.
pub const HASH_KIND_DEFAULT: HashKind = HashKind::Xx64Seed0;

/// Compute 64-bit stable hash of a key for given kind.
pub fn hash64(kind: HashKind, key: &[u8]) -> u64 {
    match kind {
        HashKind::Xx64Seed0 => {
            let mut h = XxHash64::with_seed(0);
            h.write(key);
            h.finish()
        }
        HashKind::Xx32Seed0 => {
            let mut h = XxHash32::with_seed(0);
            h.write(key);
            h.finish()
        }
    }
}

/// Compute bucket index from a 64-bit hash value.
#[inline]
pub fn bucket_index(hash: u64, buckets: u32) -> u32 {
    debug_assert!(buckets > 0, "buckets must be > 0");
    (hash % (buckets as u64)) as u32
}

/// Stable mapping from key -> bucket using the selected hash kind.
#[inline]
pub fn bucket_of_key(kind: HashKind, key: &[u8], buckets: u32) -> u32 {
    bucket_index(hash64(kind, key), buckets)
}
