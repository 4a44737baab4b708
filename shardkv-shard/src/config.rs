use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::{ShardError, ShardId};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
/// A single shard as declared in the shard config file.
pub struct Shard {
    #[serde(rename = "shardId")]
    /// The unique id of the shard, this is what keys hash to.
    pub shard_id: ShardId,
    /// The unique name of the shard.
    ///
    /// A node identifies which shard it serves by this name.
    pub name: String,
    /// The `host:port` the shard's leader serves HTTP on.
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
/// The full list of shards in the cluster.
///
/// ```toml
/// [[shard]]
/// shardId = 0
/// name = "moscow"
/// address = "127.0.0.2:8080"
/// ```
pub struct ShardConfig {
    #[serde(rename = "shard", default)]
    pub shards: Vec<Shard>,
}

impl ShardConfig {
    /// Reads and parses the shard config file at the given path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShardError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;

        debug!(
            path = %path.display(),
            num_shards = config.shards.len(),
            "Loaded shard config."
        );

        Ok(config)
    }

    /// Parses a shard config from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ShardError> {
        toml::from_str(contents).map_err(ShardError::from)
    }

    /// Returns the id of the shard with the given name.
    pub fn shard_id_of(&self, name: &str) -> Option<ShardId> {
        self.shards
            .iter()
            .find(|shard| shard.name == name)
            .map(|shard| shard.shard_id)
    }

    /// Returns the address of every configured shard keyed by shard id.
    ///
    /// If a shard id is declared more than once the last declaration wins,
    /// use [crate::ShardMetadata::build] to reject such configs.
    pub fn address_mapping(&self) -> BTreeMap<ShardId, String> {
        self.shards
            .iter()
            .map(|shard| (shard.shard_id, shard.address.clone()))
            .collect()
    }
}
