#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use hyper::{HeaderMap, StatusCode};
use shardkv_shard::ShardMetadata;

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends a GET request with the given query parameters to a node.
pub async fn call(
    addr: SocketAddr,
    path: &str,
    params: &[(&str, &str)],
) -> Result<HttpResponse> {
    let query = serde_urlencoded::to_string(params)?;
    let uri = format!("http://{addr}{path}?{query}").parse()?;

    let response = hyper::Client::new().get(uri).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = hyper::body::to_bytes(response.into_body()).await?;

    Ok(HttpResponse {
        status,
        headers,
        body: String::from_utf8(body.to_vec())?,
    })
}

/// Builds the shard metadata of a cluster where shard `i` is served at `addrs[i]`.
pub fn metadata(current: u32, addrs: &[SocketAddr]) -> ShardMetadata {
    let addrs = addrs
        .iter()
        .enumerate()
        .map(|(shard_id, addr)| (shard_id as u32, addr.to_string()))
        .collect::<BTreeMap<_, _>>();

    ShardMetadata::from_parts(current, addrs).expect("Build metadata")
}

/// Polls the condition until it holds or a few seconds have passed.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..150 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
