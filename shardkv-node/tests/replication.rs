mod common;

use std::time::Duration;

use anyhow::Result;
use hyper::StatusCode;
use shardkv_lmdb::LmdbStorage;
use shardkv_node::{NodeConfig, NodeRole, ShardNode};
use shardkv_replication::test_utils::MemStore;
use shardkv_replication::{NextKeyValue, ReplicationConfig, Storage, SyncerState};

use crate::common::{call, metadata, wait_for};

fn fast_replication() -> ReplicationConfig {
    ReplicationConfig {
        interval: Duration::from_millis(20),
        request_timeout: Duration::from_secs(2),
        max_entries_per_tick: 1,
    }
}

#[tokio::test]
async fn test_replica_follows_leader() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let leader_addr = test_helper::get_unused_addr();
    let replica_addr = test_helper::get_unused_addr();

    let leader_store = MemStore::default();
    let replica_store = MemStore::default();

    let leader = ShardNode::start(
        NodeConfig::new(leader_addr, metadata(0, &[leader_addr])),
        leader_store.clone(),
    )
    .await?;
    let replica = ShardNode::start(
        NodeConfig::new(replica_addr, metadata(0, &[leader_addr]))
            .with_role(NodeRole::Replica)
            .with_replication(fast_replication()),
        replica_store.clone(),
    )
    .await?;

    for (key, value) in [("USA", "Washington"), ("moscow", "russia"), ("minsk", "belarus")] {
        let res = call(leader_addr, "/set", &[("key", key), ("value", value)]).await?;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    }

    let drained = wait_for(|| {
        leader_store.pending_entries().is_empty()
            && replica_store.primary_entries().len() == 3
    })
    .await;
    assert!(drained, "Replica should catch up with the leader.");
    assert_eq!(replica_store.primary_entries(), leader_store.primary_entries());
    assert!(
        replica_store.pending_entries().is_empty(),
        "Replicas must not enqueue what they receive."
    );

    let res = call(replica_addr, "/get", &[("key", "USA")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "Washington");

    let res = call(replica_addr, "/set", &[("key", "USA"), ("value", "Moscow")]).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, "node is a read-only replica");
    assert_eq!(replica_store.get("USA").await?.as_deref(), Some("Washington"));

    let stats = replica.replication_statistics().expect("Replica statistics");
    assert!(wait_for(|| stats.num_applied() >= 3).await);
    assert!(matches!(
        replica.syncer_state(),
        Some(SyncerState::Idle | SyncerState::Syncing)
    ));

    replica.shutdown().await?;
    leader.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_replica_survives_missing_leader() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let leader_addr = test_helper::get_unused_addr();
    let replica_addr = test_helper::get_unused_addr();

    let replica_store = MemStore::default();
    let replica = ShardNode::start(
        NodeConfig::new(replica_addr, metadata(0, &[leader_addr]))
            .with_role(NodeRole::Replica)
            .with_replication(fast_replication()),
        replica_store.clone(),
    )
    .await?;

    let stats = replica.replication_statistics().expect("Replica statistics");
    assert!(wait_for(|| stats.num_failed_syncs() >= 2).await);

    // The leader comes up late and the replica picks up its writes.
    let leader_store = MemStore::default();
    leader_store.put("USA", "Washington").await?;
    let leader = ShardNode::start(
        NodeConfig::new(leader_addr, metadata(0, &[leader_addr])),
        leader_store.clone(),
    )
    .await?;

    assert!(wait_for(|| replica_store.primary_entries().contains_key("USA")).await);
    assert!(wait_for(|| leader_store.pending_entries().is_empty()).await);

    replica.shutdown().await?;
    leader.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_acknowledgment_is_value_checked() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = test_helper::get_unused_addr();
    let store = MemStore::default();
    let node = ShardNode::start(NodeConfig::new(addr, metadata(0, &[addr])), store.clone())
        .await?;

    call(addr, "/set", &[("key", "USA"), ("value", "Washington")]).await?;

    let res = call(addr, "/replicate", &[]).await?;
    assert_eq!(res.status, StatusCode::OK);
    let next: NextKeyValue = serde_json::from_str(&res.body)?;
    assert_eq!(next, NextKeyValue::entry("USA", "Washington"));

    // A newer write lands before the stale acknowledgment.
    call(addr, "/set", &[("key", "USA"), ("value", "Washington DC")]).await?;

    let res = call(addr, "/deleteReplica", &[("key", "USA"), ("value", "Washington")]).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, "value mismatch for key USA");
    assert_eq!(
        store.pending_entries().get("USA").map(String::as_str),
        Some("Washington DC"),
    );

    let res = call(addr, "/deleteReplica", &[("key", "USA"), ("value", "Washington DC")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "ok");

    let res = call(addr, "/deleteReplica", &[("key", "USA"), ("value", "Washington DC")]).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, "key USA not found");

    let res = call(addr, "/replicate", &[]).await?;
    assert_eq!(res.body, r#"{"key":"","value":"","err":null}"#);

    node.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_lmdb_node_restart() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let path = test_helper::temp_dir();
    let addr = test_helper::get_unused_addr();

    let node = ShardNode::start(
        NodeConfig::new(addr, metadata(0, &[addr])),
        LmdbStorage::open(&path).await?,
    )
    .await?;
    let res = call(addr, "/set", &[("key", "USA"), ("value", "Washington")]).await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    node.shutdown().await?;

    let addr = test_helper::get_unused_addr();
    let node = ShardNode::start(
        NodeConfig::new(addr, metadata(0, &[addr])),
        LmdbStorage::open(&path).await?,
    )
    .await?;

    let res = call(addr, "/get", &[("key", "USA")]).await?;
    assert_eq!(res.body, "Washington");

    let res = call(addr, "/replicate", &[]).await?;
    let next: NextKeyValue = serde_json::from_str(&res.body)?;
    assert_eq!(next, NextKeyValue::entry("USA", "Washington"));

    node.shutdown().await?;

    Ok(())
}
