use std::io;

use thiserror::Error;

use crate::ShardId;

#[derive(Debug, Error)]
/// A failure while loading the shard table or resolving a key against it.
///
/// All of these are configuration problems, a node which hits one while
/// starting up should not serve traffic.
pub enum ShardError {
    #[error("Failed to read shard config: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse shard config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Duplicate shard id {0}")]
    DuplicateShardId(ShardId),

    #[error("Shard {0:?} not found")]
    /// The node's own shard name does not match any configured shard.
    SelfNotFound(String),

    #[error("No address configured for shard {0}")]
    /// A key hashed to a shard id which has no address.
    UnknownShard(ShardId),

    #[error("Leader address not found for shard id {0}")]
    MissingLeaderAddress(ShardId),
}
