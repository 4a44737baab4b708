//! # shardkv replication
//!
//! Leader to replica replication for a shardkv shard.
//!
//! Every local write on a leader is stored twice in one transaction: once in the
//! primary namespace and once in the pending namespace. The pending namespace is
//! a log of writes no replica has acknowledged yet.
//!
//! A replica runs a [ReplicationHandle] returned by [start_replication_syncer],
//! which periodically:
//!
//! 1. Pulls the first pending entry from the leader's `/replicate` endpoint.
//! 2. Applies it to its own primary namespace, without enqueueing it again.
//! 3. Acknowledges it through `/deleteReplica` with the exact key and value.
//!
//! The leader only removes the pending entry if the acknowledged value still
//! matches, so a stale acknowledgment can never drop a newer write. Anything
//! which goes wrong is logged and retried on the next tick, applying the same
//! entry twice is harmless.

#[macro_use]
extern crate tracing;

mod client;
mod error;
mod protocol;
mod statistics;
mod storage;
mod syncer;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::ReplicationClient;
pub use error::ReplicationError;
pub use protocol::{NextKeyValue, ACK_BODY, DELETE_REPLICA_PATH, REPLICATE_PATH};
pub use statistics::ReplicationStatistics;
#[cfg(any(test, feature = "test-utils"))]
pub use storage::test_suite;
pub use storage::{PendingRemoval, Storage};
pub use syncer::{
    start_replication_syncer,
    sync_once,
    ReplicationConfig,
    ReplicationHandle,
    ReplicationSyncerContext,
    SyncOutcome,
    SyncerState,
    DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SYNC_INTERVAL,
    MIN_SYNC_INTERVAL,
};
