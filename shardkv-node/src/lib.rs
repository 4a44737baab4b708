//! # shardkv node
//!
//! The HTTP facing part of a shardkv node.
//!
//! A node serves one shard of the keyspace. Requests for keys owned by another
//! shard are forwarded to the owning node and its response is relayed
//! unchanged. Leaders accept writes for their shard and keep a log of pending
//! writes, replicas pull that log and copy it into their own storage.
//!
//! | Path | Params | Response |
//! |---|---|---|
//! | `/set` | `key`, `value` | empty body |
//! | `/get` | `key` | the stored value, empty if absent |
//! | `/purge` | | `Error = <nil>` or the error message |
//! | `/replicate` | | the first pending entry as JSON |
//! | `/deleteReplica` | `key`, `value` | `ok` |
//!
//! Failures are answered with a `500` and the error message as the body.

#[macro_use]
extern crate tracing;

mod api;
mod config;
mod error;
mod proxy;

use std::net::SocketAddr;
use std::sync::Arc;

pub use api::{
    purge_foreign_keys,
    GET_PATH,
    KEY_PRESENT_HEADER,
    PURGE_PATH,
    SET_PATH,
};
pub use config::{NodeConfig, NodeRole, DEFAULT_FORWARD_TIMEOUT};
pub use error::{ApiError, ForwardError, NodeError};
pub use proxy::FORWARDED_HEADER;
use shardkv_replication::{
    start_replication_syncer,
    ReplicationHandle,
    ReplicationStatistics,
    ReplicationSyncerContext,
    Storage,
    SyncerState,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::ApiState;

/// A running shardkv node.
///
/// The node must be stopped with [ShardNode::shutdown] for the storage to be
/// closed cleanly.
pub struct ShardNode<S>
where
    S: Storage + Send + Sync + 'static,
{
    config: Arc<NodeConfig>,
    local_addr: SocketAddr,
    storage: Arc<S>,
    stop_server: oneshot::Sender<()>,
    server: JoinHandle<()>,
    syncer: Option<ReplicationHandle>,
}

impl<S> ShardNode<S>
where
    S: Storage + Send + Sync + 'static,
{
    /// Starts serving the node's HTTP API on the configured address.
    ///
    /// Replicas also start pulling pending writes from the leader of their
    /// shard. Startup fails if the shard table has no address for the node's
    /// own shard.
    pub async fn start(config: NodeConfig, storage: S) -> Result<Self, NodeError> {
        let config = Arc::new(config);
        let storage = Arc::new(storage);
        let leader_addr = config.metadata.leader_addr()?.to_string();

        let app = api::router(ApiState::new(storage.clone(), config.clone()));
        let server = axum::Server::try_bind(&config.listen_addr)?
            .serve(app.into_make_service());
        let local_addr = server.local_addr();

        let (stop_server, stopped) = oneshot::channel();
        let server = server.with_graceful_shutdown(async move {
            let _ = stopped.await;
        });
        let server = tokio::spawn(async move {
            if let Err(e) = server.await {
                error!(error = ?e, "Server failed to handle requests.");
            }
        });

        let syncer = match config.role {
            NodeRole::Leader => None,
            NodeRole::Replica => {
                let ctx = ReplicationSyncerContext {
                    storage: storage.clone(),
                    leader_addr: leader_addr.clone(),
                    config: config.replication.clone(),
                };
                Some(start_replication_syncer(ctx))
            },
        };

        info!(
            shard_id = config.metadata.current_shard_id(),
            num_shards = config.metadata.count(),
            role = ?config.role,
            listen_addr = %local_addr,
            leader_addr = %leader_addr,
            "Shard node started."
        );

        Ok(Self {
            config,
            local_addr,
            storage,
            stop_server,
            server,
            syncer,
        })
    }

    /// Shuts down the node.
    ///
    /// The server stops accepting connections and the syncer is stopped.
    /// Once every in-flight request has finished the storage is closed.
    pub async fn shutdown(self) -> Result<(), NodeError> {
        let _ = self.stop_server.send(());

        if let Some(syncer) = self.syncer {
            syncer.shutdown().await;
        }

        if let Err(e) = self.server.await {
            error!(error = ?e, "Server task failed.");
        }

        self.storage
            .close()
            .await
            .map_err(|e| NodeError::Storage(Box::new(e)))?;

        info!(listen_addr = %self.local_addr, "Shard node shut down.");

        Ok(())
    }

    #[inline]
    /// The address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[inline]
    /// The config the node was started with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    #[inline]
    /// The storage the node runs on.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The current state of the replication syncer, replicas only.
    pub fn syncer_state(&self) -> Option<SyncerState> {
        self.syncer.as_ref().map(|syncer| syncer.state())
    }

    /// The live replication statistics, replicas only.
    pub fn replication_statistics(&self) -> Option<ReplicationStatistics> {
        self.syncer.as_ref().map(|syncer| syncer.statistics())
    }
}
