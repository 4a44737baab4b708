use serde::{Deserialize, Serialize};

/// The leader endpoint serving the first pending entry.
pub const REPLICATE_PATH: &str = "/replicate";
/// The leader endpoint acknowledging (removing) a pending entry.
pub const DELETE_REPLICA_PATH: &str = "/deleteReplica";
/// The body the leader responds with when an acknowledgment succeeds.
pub const ACK_BODY: &str = "ok";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// The JSON payload of the `/replicate` endpoint.
///
/// When nothing is pending `key` and `value` are empty. When the leader failed
/// to read its pending namespace `err` contains the reason.
pub struct NextKeyValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub err: Option<String>,
}

impl NextKeyValue {
    /// A pending entry.
    pub fn entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            err: None,
        }
    }

    /// Nothing is currently pending.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The leader failed to read its pending entries.
    pub fn error(msg: impl ToString) -> Self {
        Self {
            err: Some(msg.to_string()),
            ..Self::default()
        }
    }

    #[inline]
    /// Returns if the payload carries no entry.
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}
