//! # shardkv shard table
//!
//! The static partition map of a shardkv cluster.
//!
//! Every node is started with the same list of [Shard] records and the name of
//! the shard it serves. From that the node derives a [ShardMetadata] which
//! answers two questions for any key: which shard owns it, and where the owning
//! node can be reached.
//!
//! Placement is a pure function of the key bytes and the number of shards,
//! changing the number of shards moves almost every key.
//!
//! ```rust
//! use shardkv_shard::{Route, ShardConfig, ShardMetadata};
//!
//! let config = ShardConfig::from_toml(r#"
//!     [[shard]]
//!     shardId = 0
//!     name = "moscow"
//!     address = "127.0.0.1:8080"
//!
//!     [[shard]]
//!     shardId = 1
//!     name = "minsk"
//!     address = "127.0.0.1:8081"
//! "#).expect("Parse config");
//!
//! let metadata = ShardMetadata::build(&config.shards, "moscow").expect("Build metadata");
//! assert_eq!(metadata.route("USA").unwrap(), Route::Local);
//! assert_eq!(
//!     metadata.route("INDIAfsdfsfs").unwrap(),
//!     Route::Remote("127.0.0.1:8081".to_string()),
//! );
//! ```

#[macro_use]
extern crate tracing;

mod config;
mod error;
mod metadata;

use std::hash::Hasher;

pub use config::{Shard, ShardConfig};
pub use error::ShardError;
pub use metadata::{Route, ShardMetadata};

/// Identifier of a shard as declared in the shard config.
pub type ShardId = u32;

/// Computes the shard which owns `key` in a cluster of `count` shards.
///
/// The key is hashed with 64 bit FNV-1 over its UTF-8 bytes and reduced
/// modulo `count`. The result is stable across processes and platforms.
///
/// # Panics
///
/// Panics if `count` is `0`.
pub fn shard_for(key: &str, count: u32) -> ShardId {
    assert!(count > 0, "shard count must be non-zero");

    let mut hasher = Fnv1Hasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() % count as u64) as ShardId
}

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// A 64 bit FNV-1 hasher, multiplying before xoring in each byte.
///
/// This is not the FNV-1a variant, the two place keys differently once a
/// cluster has more than two shards.
pub struct Fnv1Hasher(u64);

impl Default for Fnv1Hasher {
    fn default() -> Self {
        Self(FNV_OFFSET_BASIS)
    }
}

impl Hasher for Fnv1Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 = self.0.wrapping_mul(FNV_PRIME);
            self.0 ^= *byte as u64;
        }
    }
}
