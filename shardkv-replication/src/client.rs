use std::time::Duration;

use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::{Client, StatusCode, Uri};

use crate::protocol::{NextKeyValue, ACK_BODY, DELETE_REPLICA_PATH, REPLICATE_PATH};
use crate::ReplicationError;

#[derive(Clone)]
/// A HTTP client talking to the leader of the replica's shard.
///
/// Every request is bounded by the configured timeout so a stalled leader
/// cannot hold up the syncer indefinitely.
///
/// This client is cheap to clone.
pub struct ReplicationClient {
    leader_addr: String,
    timeout: Duration,
    client: Client<HttpConnector>,
}

impl ReplicationClient {
    /// Creates a new client for the leader serving HTTP on `leader_addr`.
    pub fn new(leader_addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            leader_addr: leader_addr.into(),
            timeout,
            client: Client::new(),
        }
    }

    #[inline]
    /// The `host:port` of the leader.
    pub fn leader_addr(&self) -> &str {
        &self.leader_addr
    }

    /// Pulls the first pending entry from the leader.
    ///
    /// Returns `None` if the leader has nothing pending.
    pub async fn poll_next(&self) -> Result<Option<(String, String)>, ReplicationError> {
        let (status, body) = self.get(REPLICATE_PATH).await?;
        if status != StatusCode::OK {
            return Err(ReplicationError::UnexpectedStatus {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let next: NextKeyValue = serde_json::from_slice(&body)?;
        if let Some(err) = next.err {
            return Err(ReplicationError::Leader(err));
        }

        if next.is_empty() {
            return Ok(None);
        }

        Ok(Some((next.key, next.value)))
    }

    /// Acknowledges that the given entry has been applied.
    ///
    /// The leader only removes its pending entry if it still holds exactly
    /// this value for the key.
    pub async fn acknowledge(&self, key: &str, value: &str) -> Result<(), ReplicationError> {
        let query = serde_urlencoded::to_string([("key", key), ("value", value)])?;
        let (status, body) = self.get(&format!("{DELETE_REPLICA_PATH}?{query}")).await?;

        if status == StatusCode::OK && body.as_ref() == ACK_BODY.as_bytes() {
            return Ok(());
        }

        Err(ReplicationError::AckRejected {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    async fn get(&self, path_and_query: &str) -> Result<(StatusCode, Bytes), ReplicationError> {
        let uri: Uri = format!("http://{}{}", self.leader_addr, path_and_query).parse()?;

        let request = async {
            let response = self.client.get(uri).await?;
            let status = response.status();
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, hyper::Error>((status, body))
        };

        let res = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ReplicationError::Timeout(self.timeout))?;

        Ok(res?)
    }
}
