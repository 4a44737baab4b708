//! # shardkv
//! A horizontally sharded key-value store.
//!
//! This is a convenience package which includes all of the sub-projects within
//! shardkv, realistically you probably only want some of these projects:
//!
//! ### Features
//! - `shardkv_shard` - The shard table and FNV based key placement.
//! - `shardkv_replication` - The storage contract and the leader to replica syncer.
//! - `shardkv_lmdb` - A implementation of the `shardkv_replication::Storage` trait using LMDB.
//! - `shardkv_node` - The HTTP API, request forwarding and node lifecycle.

#[cfg(feature = "shardkv-lmdb")]
pub use shardkv_lmdb as lmdb;
#[cfg(feature = "shardkv-node")]
pub use shardkv_node as node;
#[cfg(feature = "shardkv-replication")]
pub use shardkv_replication as replication;
#[cfg(feature = "shardkv-shard")]
pub use shardkv_shard as shard;
