use std::time::Duration;

use axum::body::{boxed, Body, Full};
use axum::http::header::{self, HeaderName};
use axum::http::{HeaderValue, Request, Uri};
use axum::response::Response;
use hyper::client::HttpConnector;
use hyper::Client;

use crate::error::ForwardError;

/// Marks a request which has already been forwarded by another node.
pub const FORWARDED_HEADER: &str = "x-shardkv-forwarded";

#[derive(Clone)]
/// Relays requests for keys owned by other shards to the owning node.
///
/// The upstream response is copied back as is, including error responses.
pub(crate) struct Forwarder {
    client: Client<HttpConnector>,
    timeout: Duration,
}

impl Forwarder {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    /// Sends the request to `addr` and returns the upstream response.
    ///
    /// Method, path, query and end to end headers are kept.
    pub(crate) async fn forward(
        &self,
        addr: &str,
        req: Request<Body>,
    ) -> Result<Response, ForwardError> {
        let (parts, body) = req.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri: Uri = format!("http://{addr}{path_and_query}").parse()?;

        let mut upstream = Request::builder().method(parts.method).uri(uri);
        for (name, value) in parts.headers.iter() {
            if name == header::HOST || is_hop_by_hop(name) {
                continue;
            }
            upstream = upstream.header(name, value);
        }
        let upstream = upstream
            .header(FORWARDED_HEADER, HeaderValue::from_static("1"))
            .body(body)?;

        let call = async {
            let response = self.client.request(upstream).await?;
            let (parts, body) = response.into_parts();
            let body = hyper::body::to_bytes(body).await?;
            Ok::<_, hyper::Error>((parts, body))
        };

        let (parts, body) = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))??;

        let mut response = hyper::Response::builder().status(parts.status);
        for (name, value) in parts.headers.iter() {
            if name == header::CONTENT_LENGTH || is_hop_by_hop(name) {
                continue;
            }
            response = response.header(name, value);
        }

        Ok(response.body(boxed(Full::from(body)))?)
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
        || name == header::TE
        || name == header::TRAILER
        || name == header::UPGRADE
        || name == header::PROXY_AUTHORIZATION
        || name.as_str() == "keep-alive"
}
