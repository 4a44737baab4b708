use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::{shard_for, Shard, ShardError, ShardId};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where a key should be served from.
pub enum Route {
    /// The key belongs to the shard this node serves.
    Local,
    /// The key belongs to the shard served at the given address.
    Remote(String),
}

#[derive(Debug, Clone)]
/// The process wide view of the shard table.
///
/// Built once at startup and never mutated afterwards.
pub struct ShardMetadata {
    count: u32,
    current_shard_id: ShardId,
    addrs: BTreeMap<ShardId, String>,
}

impl ShardMetadata {
    /// Builds the shard metadata for the node serving the shard named `self_name`.
    ///
    /// Fails if two shards share an id or if no shard is named `self_name`.
    pub fn build(shards: &[Shard], self_name: &str) -> Result<Self, ShardError> {
        let mut addrs = BTreeMap::new();
        let mut current_shard_id = None;

        for shard in shards {
            match addrs.entry(shard.shard_id) {
                Entry::Occupied(_) => {
                    return Err(ShardError::DuplicateShardId(shard.shard_id));
                },
                Entry::Vacant(entry) => {
                    entry.insert(shard.address.clone());
                },
            }

            if shard.name == self_name {
                current_shard_id = Some(shard.shard_id);
            }
        }

        let current_shard_id = current_shard_id
            .ok_or_else(|| ShardError::SelfNotFound(self_name.to_string()))?;

        Ok(Self {
            count: shards.len() as u32,
            current_shard_id,
            addrs,
        })
    }

    /// Creates metadata from an already validated address table.
    ///
    /// The shard count is the number of entries in `addrs`.
    pub fn from_parts(
        current_shard_id: ShardId,
        addrs: BTreeMap<ShardId, String>,
    ) -> Result<Self, ShardError> {
        if !addrs.contains_key(&current_shard_id) {
            return Err(ShardError::SelfNotFound(current_shard_id.to_string()));
        }

        Ok(Self {
            count: addrs.len() as u32,
            current_shard_id,
            addrs,
        })
    }

    #[inline]
    /// The number of shards in the cluster.
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    /// The id of the shard this node serves.
    pub fn current_shard_id(&self) -> ShardId {
        self.current_shard_id
    }

    #[inline]
    /// The address of every shard keyed by shard id.
    pub fn addrs(&self) -> &BTreeMap<ShardId, String> {
        &self.addrs
    }

    /// Returns the address of the given shard, if configured.
    pub fn address_of(&self, shard_id: ShardId) -> Option<&str> {
        self.addrs.get(&shard_id).map(String::as_str)
    }

    /// Returns the address of the leader of the shard this node serves.
    ///
    /// Replicas pull their pending writes from this address.
    pub fn leader_addr(&self) -> Result<&str, ShardError> {
        self.address_of(self.current_shard_id)
            .ok_or(ShardError::MissingLeaderAddress(self.current_shard_id))
    }

    #[inline]
    /// The shard which owns the given key.
    pub fn shard_for(&self, key: &str) -> ShardId {
        shard_for(key, self.count)
    }

    #[inline]
    /// Returns if the given key is owned by the shard this node serves.
    pub fn is_local(&self, key: &str) -> bool {
        self.shard_for(key) == self.current_shard_id
    }

    /// Decides if the key is served locally or by a remote shard.
    ///
    /// If the key hashes to a shard id with no address this fails rather
    /// than guessing a node.
    pub fn route(&self, key: &str) -> Result<Route, ShardError> {
        let shard_id = self.shard_for(key);
        if shard_id == self.current_shard_id {
            return Ok(Route::Local);
        }

        self.address_of(shard_id)
            .map(|addr| Route::Remote(addr.to_string()))
            .ok_or(ShardError::UnknownShard(shard_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shard(shard_id: ShardId, name: &str, address: &str) -> Shard {
        Shard {
            shard_id,
            name: name.to_string(),
            address: address.to_string(),
        }
    }

    fn two_shards() -> Vec<Shard> {
        vec![
            shard(0, "moscow", "127.0.0.2:8080"),
            shard(1, "minsk", "127.0.0.3:8080"),
        ]
    }

    #[test]
    fn test_build_metadata() {
        let metadata = ShardMetadata::build(&two_shards(), "minsk").expect("Build");
        assert_eq!(metadata.count(), 2);
        assert_eq!(metadata.current_shard_id(), 1);
        assert_eq!(metadata.address_of(0), Some("127.0.0.2:8080"));
        assert_eq!(metadata.leader_addr().unwrap(), "127.0.0.3:8080");
    }

    #[test]
    fn test_build_duplicate_shard_id() {
        let shards = vec![
            shard(0, "moscow", "127.0.0.2:8080"),
            shard(0, "minsk", "127.0.0.3:8080"),
        ];

        let res = ShardMetadata::build(&shards, "moscow");
        assert!(
            matches!(res, Err(ShardError::DuplicateShardId(0))),
            "Got {res:?}"
        );
    }

    #[test]
    fn test_build_self_not_found() {
        let res = ShardMetadata::build(&two_shards(), "kyiv");
        assert!(
            matches!(res, Err(ShardError::SelfNotFound(ref name)) if name == "kyiv"),
            "Got {res:?}"
        );

        let res = ShardMetadata::build(&[], "kyiv");
        assert!(matches!(res, Err(ShardError::SelfNotFound(_))), "Got {res:?}");
    }

    #[test]
    fn test_route() {
        let moscow = ShardMetadata::build(&two_shards(), "moscow").expect("Build");
        let minsk = ShardMetadata::build(&two_shards(), "minsk").expect("Build");

        assert_eq!(moscow.route("USA").unwrap(), Route::Local);
        assert_eq!(
            moscow.route("INDIAfsdfsfs").unwrap(),
            Route::Remote("127.0.0.3:8080".to_string())
        );
        assert_eq!(
            minsk.route("USA").unwrap(),
            Route::Remote("127.0.0.2:8080".to_string())
        );
        assert_eq!(minsk.route("INDIAfsdfsfs").unwrap(), Route::Local);

        assert!(moscow.is_local("USA"));
        assert!(!moscow.is_local("INDIAfsdfsfs"));
    }

    #[test]
    fn test_route_fails_closed() {
        // Ids 0 and 5 are configured but keys hash into [0, 2).
        let shards = vec![
            shard(0, "moscow", "127.0.0.2:8080"),
            shard(5, "minsk", "127.0.0.3:8080"),
        ];
        let metadata = ShardMetadata::build(&shards, "moscow").expect("Build");

        assert_eq!(metadata.route("USA").unwrap(), Route::Local);
        let res = metadata.route("INDIAfsdfsfs");
        assert!(matches!(res, Err(ShardError::UnknownShard(1))), "Got {res:?}");
    }

    #[test]
    fn test_from_parts() {
        let addrs = BTreeMap::from_iter([
            (0, "127.0.0.2:8080".to_string()),
            (1, "127.0.0.3:8080".to_string()),
        ]);

        let metadata = ShardMetadata::from_parts(1, addrs.clone()).expect("Build");
        assert_eq!(metadata.count(), 2);
        assert!(metadata.is_local("INDIAfsdfsfs"));

        let res = ShardMetadata::from_parts(3, addrs);
        assert!(matches!(res, Err(ShardError::SelfNotFound(_))), "Got {res:?}");
    }
}
