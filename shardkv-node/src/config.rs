use std::net::SocketAddr;
use std::time::Duration;

use shardkv_replication::ReplicationConfig;
use shardkv_shard::ShardMetadata;

/// The time a forwarded request may take before the caller gets a `500`.
pub const DEFAULT_FORWARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The part a node plays for its shard.
pub enum NodeRole {
    /// Accepts client writes for the shard's keys and serves pending writes.
    Leader,
    /// Copies the leader's writes and rejects client writes for its own keys.
    Replica,
}

#[derive(Debug, Clone)]
/// The settings of a single node.
///
/// This is built once at startup and shared with every component.
pub struct NodeConfig {
    /// The address for the HTTP server to listen on.
    pub listen_addr: SocketAddr,
    /// The shard table and which shard this node serves.
    pub metadata: ShardMetadata,
    pub role: NodeRole,
    /// The replication syncer settings, only used by replicas.
    pub replication: ReplicationConfig,
    /// The timeout applied to requests forwarded to other shards.
    pub forward_timeout: Duration,
}

impl NodeConfig {
    /// Creates a new leader config with the default settings.
    pub fn new(listen_addr: SocketAddr, metadata: ShardMetadata) -> Self {
        Self {
            listen_addr,
            metadata,
            role: NodeRole::Leader,
            replication: ReplicationConfig::default(),
            forward_timeout: DEFAULT_FORWARD_TIMEOUT,
        }
    }

    /// Set the role of the node.
    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    /// Set the replication syncer settings.
    pub fn with_replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = replication;
        self
    }

    /// Set the timeout for forwarded requests.
    pub fn with_forward_timeout(mut self, timeout: Duration) -> Self {
        self.forward_timeout = timeout;
        self
    }
}
