use std::error::Error;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shardkv_shard::{ShardError, ShardId};
use thiserror::Error;

type BoxedError = Box<dyn Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid shard configuration: {0}")]
    /// The shard table is unusable for this node.
    Shard(#[from] ShardError),

    #[error("Failed to start the HTTP server: {0}")]
    /// The HTTP listener could not be bound.
    Server(#[from] hyper::Error),

    #[error("Storage error: {0}")]
    Storage(BoxedError),
}

#[derive(Debug, Error)]
/// A request could not be relayed to the shard owning the key.
pub enum ForwardError {
    #[error("Invalid upstream URI: {0}")]
    InvalidUri(#[from] hyper::http::uri::InvalidUri),

    #[error("Failed to build request: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] hyper::Error),

    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
/// A failure while handling a client request.
///
/// Every variant is reported as a `500` with the message as the body.
pub enum ApiError {
    #[error("{0}")]
    Storage(BoxedError),

    #[error("{0}")]
    Routing(#[from] ShardError),

    #[error("{0}")]
    Forward(#[from] ForwardError),

    #[error("node is a read-only replica")]
    ReadOnlyReplica,

    #[error("key {key} belongs to shard {shard_id} but was forwarded to this node")]
    ForwardLoop { key: String, shard_id: ShardId },

    #[error("key {0} not found")]
    PendingNotFound(String),

    #[error("value mismatch for key {0}")]
    ValueMismatch(String),
}

impl ApiError {
    pub(crate) fn storage(error: impl Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(error))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self, "Failed to handle request.");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}
