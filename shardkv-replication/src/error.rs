use std::error::Error;
use std::time::Duration;

use hyper::http::uri::InvalidUri;
use hyper::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
/// A failure while pulling from or acknowledging to the leader.
///
/// None of these stop the syncer, the failed step is retried on a later tick.
pub enum ReplicationError {
    #[error("Invalid leader uri: {0}")]
    InvalidUri(#[from] InvalidUri),

    #[error("Request to leader failed: {0}")]
    Transport(#[from] hyper::Error),

    #[error("Request to leader timed out after {0:?}")]
    Timeout(Duration),

    #[error("Leader responded with unexpected status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("Failed to decode replication entry: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to encode acknowledgment: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("Leader failed to produce a replication entry: {0}")]
    Leader(String),

    #[error("Leader rejected acknowledgment ({status}): {body}")]
    /// The leader still has the entry pending, typically because the value
    /// was overwritten after it was pulled.
    AckRejected { status: StatusCode, body: String },

    #[error("Failed to apply entry locally: {0}")]
    Storage(Box<dyn Error + Send + Sync + 'static>),
}
