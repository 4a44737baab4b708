mod common;

use anyhow::Result;
use hyper::StatusCode;
use shardkv_node::{NodeConfig, ShardNode, FORWARDED_HEADER, KEY_PRESENT_HEADER};
use shardkv_replication::test_utils::MemStore;
use shardkv_replication::Storage;

use crate::common::{call, metadata};

const KEYS: [(&str, u32); 2] = [("USA", 0), ("INDIAfsdfsfs", 1)];

#[tokio::test]
async fn test_cross_shard_set_and_get() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let addrs = [test_helper::get_unused_addr(), test_helper::get_unused_addr()];
    let store_0 = MemStore::default();
    let store_1 = MemStore::default();

    let node_0 =
        ShardNode::start(NodeConfig::new(addrs[0], metadata(0, &addrs)), store_0.clone())
            .await?;
    let node_1 =
        ShardNode::start(NodeConfig::new(addrs[1], metadata(1, &addrs)), store_1.clone())
            .await?;

    for (key, _) in KEYS {
        let value = format!("value-{key}");
        let res = call(addrs[0], "/set", &[("key", key), ("value", &value)]).await?;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    }

    for addr in addrs {
        for (key, _) in KEYS {
            let res = call(addr, "/get", &[("key", key)]).await?;
            assert_eq!(res.status, StatusCode::OK, "{}", res.body);
            assert_eq!(res.body, format!("value-{key}"));
            assert_eq!(res.headers[KEY_PRESENT_HEADER], "true");
        }
    }

    // Each value must land in the storage of the node owning it.
    assert_eq!(store_0.get("USA").await?.as_deref(), Some("value-USA"));
    assert_eq!(store_0.get("INDIAfsdfsfs").await?, None);
    assert_eq!(
        store_1.get("INDIAfsdfsfs").await?.as_deref(),
        Some("value-INDIAfsdfsfs"),
    );
    assert_eq!(store_1.get("USA").await?, None);

    node_0.shutdown().await?;
    node_1.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_missing_keys_and_empty_params() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = test_helper::get_unused_addr();
    let store = MemStore::default();
    let node = ShardNode::start(NodeConfig::new(addr, metadata(0, &[addr])), store.clone())
        .await?;

    let res = call(addr, "/get", &[("key", "USA")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "");
    assert_eq!(res.headers[KEY_PRESENT_HEADER], "false");

    let res = call(addr, "/set", &[("key", "USA"), ("value", "")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    let res = call(addr, "/set", &[("key", ""), ("value", "Washington")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert!(store.primary_entries().is_empty(), "Empty params must not write.");
    assert!(store.pending_entries().is_empty(), "Empty params must not enqueue.");

    let res = call(addr, "/get", &[("key", "")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "");
    assert!(res.headers.get(KEY_PRESENT_HEADER).is_none());

    let res = call(addr, "/set", &[("key", "USA"), ("value", "Washington")]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(
        store.pending_entries().get("USA").map(String::as_str),
        Some("Washington"),
        "Local writes must enqueue a pending entry."
    );

    node.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_unreachable_owner() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    // Nothing is listening on the address of shard 1.
    let addrs = [test_helper::get_unused_addr(), test_helper::get_unused_addr()];
    let store = MemStore::default();
    let node =
        ShardNode::start(NodeConfig::new(addrs[0], metadata(0, &addrs)), store.clone())
            .await?;

    let res = call(addrs[0], "/set", &[("key", "INDIAfsdfsfs"), ("value", "delhi")]).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!res.body.is_empty(), "The error should be reported.");

    let res = call(addrs[0], "/get", &[("key", "INDIAfsdfsfs")]).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);

    assert!(store.primary_entries().is_empty());

    node.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_forwarded_requests_are_not_forwarded_again() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let addrs = [test_helper::get_unused_addr(), test_helper::get_unused_addr()];
    let node = ShardNode::start(
        NodeConfig::new(addrs[0], metadata(0, &addrs)),
        MemStore::default(),
    )
    .await?;

    let uri = format!("http://{}/get?key=INDIAfsdfsfs", addrs[0]);
    let req = hyper::Request::get(uri)
        .header(FORWARDED_HEADER, "1")
        .body(hyper::Body::empty())?;
    let response = hyper::Client::new().request(req).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = hyper::body::to_bytes(response.into_body()).await?;
    let body = String::from_utf8(body.to_vec())?;
    assert!(body.contains("forwarded"), "{body}");

    node.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_purge_removes_foreign_keys() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let addrs = [test_helper::get_unused_addr(), test_helper::get_unused_addr()];
    let store = MemStore::default();

    // Written before the cluster grew to two shards.
    store.put("USA", "Washington").await?;
    store.put("INDIAfsdfsfs", "delhi").await?;

    let node =
        ShardNode::start(NodeConfig::new(addrs[0], metadata(0, &addrs)), store.clone())
            .await?;

    let res = call(addrs[0], "/purge", &[]).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body, "Error = <nil>");

    let keys = store.primary_entries().into_keys().collect::<Vec<_>>();
    assert_eq!(keys, ["USA"]);

    node.shutdown().await?;

    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_storage() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let addr = test_helper::get_unused_addr();
    let store = MemStore::default();
    let node = ShardNode::start(NodeConfig::new(addr, metadata(0, &[addr])), store.clone())
        .await?;
    assert_eq!(node.local_addr(), addr);
    assert!(node.syncer_state().is_none(), "Leaders do not run a syncer.");

    node.shutdown().await?;

    assert!(store.get("USA").await.is_err(), "Storage should be closed.");
    assert!(
        call(addr, "/get", &[("key", "USA")]).await.is_err(),
        "Server should no longer accept requests."
    );

    Ok(())
}
