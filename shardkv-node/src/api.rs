use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use shardkv_replication::{
    NextKeyValue,
    PendingRemoval,
    Storage,
    ACK_BODY,
    DELETE_REPLICA_PATH,
    REPLICATE_PATH,
};
use shardkv_shard::{Route, ShardMetadata};

use crate::error::ApiError;
use crate::proxy::{Forwarder, FORWARDED_HEADER};
use crate::{NodeConfig, NodeRole};

pub const GET_PATH: &str = "/get";
pub const SET_PATH: &str = "/set";
pub const PURGE_PATH: &str = "/purge";
/// Tells if a `/get` response body is a stored value or an absent key.
pub const KEY_PRESENT_HEADER: &str = "x-shardkv-key-present";

pub(crate) struct ApiState<S> {
    storage: Arc<S>,
    config: Arc<NodeConfig>,
    forwarder: Forwarder,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            config: self.config.clone(),
            forwarder: self.forwarder.clone(),
        }
    }
}

impl<S> ApiState<S>
where
    S: Storage + Send + Sync + 'static,
{
    pub(crate) fn new(storage: Arc<S>, config: Arc<NodeConfig>) -> Self {
        let forwarder = Forwarder::new(config.forward_timeout);
        Self {
            storage,
            config,
            forwarder,
        }
    }

    /// Relays the request to the owning node if the key is not served here.
    ///
    /// Returns `None` if the key is local.
    async fn forward_if_remote(
        &self,
        key: &str,
        req: Request<Body>,
    ) -> Result<Option<Response>, ApiError> {
        let addr = match self.config.metadata.route(key)? {
            Route::Local => return Ok(None),
            Route::Remote(addr) => addr,
        };

        let shard_id = self.config.metadata.shard_for(key);
        if req.headers().contains_key(FORWARDED_HEADER) {
            return Err(ApiError::ForwardLoop {
                key: key.to_string(),
                shard_id,
            });
        }

        debug!(key = %key, shard_id = shard_id, addr = %addr, "Forwarding request.");
        let response = self.forwarder.forward(&addr, req).await?;
        Ok(Some(response))
    }
}

/// Builds the HTTP routes of a node.
pub(crate) fn router<S>(state: ApiState<S>) -> Router
where
    S: Storage + Send + Sync + 'static,
{
    Router::new()
        .route(GET_PATH, get(get_key::<S>))
        .route(SET_PATH, get(set_key::<S>))
        .route(PURGE_PATH, get(purge::<S>))
        .route(REPLICATE_PATH, get(replicate::<S>))
        .route(DELETE_REPLICA_PATH, get(delete_replica::<S>))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct KeyValueParams {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

async fn set_key<S>(
    State(state): State<ApiState<S>>,
    Query(params): Query<KeyValueParams>,
    req: Request<Body>,
) -> Result<Response, ApiError>
where
    S: Storage + Send + Sync + 'static,
{
    if params.key.is_empty() || params.value.is_empty() {
        debug!("Ignoring set with an empty key or value.");
        return Ok(StatusCode::OK.into_response());
    }

    if let Some(response) = state.forward_if_remote(&params.key, req).await? {
        return Ok(response);
    }

    if state.config.role == NodeRole::Replica {
        return Err(ApiError::ReadOnlyReplica);
    }

    state
        .storage
        .put(&params.key, &params.value)
        .await
        .map_err(ApiError::storage)?;

    debug!(
        key = %params.key,
        shard_id = state.config.metadata.current_shard_id(),
        "Stored key."
    );

    Ok(StatusCode::OK.into_response())
}

async fn get_key<S>(
    State(state): State<ApiState<S>>,
    Query(params): Query<KeyValueParams>,
    req: Request<Body>,
) -> Result<Response, ApiError>
where
    S: Storage + Send + Sync + 'static,
{
    if params.key.is_empty() {
        debug!("Ignoring get with an empty key.");
        return Ok(StatusCode::OK.into_response());
    }

    if let Some(response) = state.forward_if_remote(&params.key, req).await? {
        return Ok(response);
    }

    let value = state
        .storage
        .get(&params.key)
        .await
        .map_err(ApiError::storage)?;

    let present = HeaderValue::from_static(if value.is_some() { "true" } else { "false" });
    let mut response = value.unwrap_or_default().into_response();
    response.headers_mut().insert(KEY_PRESENT_HEADER, present);

    Ok(response)
}

async fn purge<S>(State(state): State<ApiState<S>>) -> String
where
    S: Storage + Send + Sync + 'static,
{
    match purge_foreign_keys(state.storage.as_ref(), &state.config.metadata).await {
        Ok(num_removed) => {
            info!(num_removed = num_removed, "Purged keys owned by other shards.");
            "Error = <nil>".to_string()
        },
        Err(e) => {
            error!(error = %e, "Failed to purge keys owned by other shards.");
            format!("Error = {e}")
        },
    }
}

/// Removes every key from the primary namespace which is not owned by the
/// shard this node serves.
///
/// Keys are collected first and deleted in a second pass, a key written in
/// between is not removed. Returns the number of removed keys.
pub async fn purge_foreign_keys<S>(
    storage: &S,
    metadata: &ShardMetadata,
) -> Result<usize, S::Error>
where
    S: Storage + Send + Sync + 'static,
{
    let foreign = storage
        .iter_keys()
        .await?
        .filter(|key| !metadata.is_local(key))
        .collect::<Vec<_>>();

    let num_removed = foreign.len();
    if num_removed > 0 {
        storage.multi_del(foreign.into_iter()).await?;
    }

    Ok(num_removed)
}

async fn replicate<S>(State(state): State<ApiState<S>>) -> Json<NextKeyValue>
where
    S: Storage + Send + Sync + 'static,
{
    let next = match state.storage.first_pending().await {
        Ok(Some((key, value))) => NextKeyValue::entry(key, value),
        Ok(None) => NextKeyValue::empty(),
        Err(e) => {
            error!(error = %e, "Failed to read pending entries.");
            NextKeyValue::error(format!(
                "error getting key value pair for replication: {e}"
            ))
        },
    };

    Json(next)
}

async fn delete_replica<S>(
    State(state): State<ApiState<S>>,
    Query(params): Query<KeyValueParams>,
) -> Result<&'static str, ApiError>
where
    S: Storage + Send + Sync + 'static,
{
    if params.key.is_empty() || params.value.is_empty() {
        debug!("Ignoring acknowledgment with an empty key or value.");
        return Ok("");
    }

    let removal = state
        .storage
        .remove_pending(&params.key, &params.value)
        .await
        .map_err(ApiError::storage)?;

    match removal {
        PendingRemoval::Removed => {
            debug!(key = %params.key, "Replica acknowledged pending entry.");
            Ok(ACK_BODY)
        },
        PendingRemoval::NotFound => Err(ApiError::PendingNotFound(params.key)),
        PendingRemoval::ValueMismatch => Err(ApiError::ValueMismatch(params.key)),
    }
}
