//! Request forwarding to the selected backend.
//!
//! One attempt per request: a network error, timeout or non-JSON response is
//! reported to the caller and never retried.

use super::client::HttpClient;
use super::headers::{filter_forward_headers, method_has_body};
use crate::error::ForwardError;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{HeaderMap, Method, Request, StatusCode, Uri};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Backend reply with its JSON body already decoded and re-encoded.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
pub struct RequestForwarder {
    client: HttpClient,
    timeout: Option<Duration>,
}

impl RequestForwarder {
    pub fn new(client: HttpClient, timeout: Option<Duration>) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Send `method target` with the filtered inbound headers. The JSON body
    /// is only sent for POST, PUT and PATCH.
    pub async fn forward(
        &self,
        method: &Method,
        target: &str,
        inbound_headers: &HeaderMap,
        body: &Value,
    ) -> Result<BackendResponse, ForwardError> {
        let uri: Uri = target.parse().map_err(|e: hyper::http::uri::InvalidUri| {
            ForwardError::InvalidTarget {
                target: target.to_string(),
                reason: e.to_string(),
            }
        })?;

        let payload = if method_has_body(method) {
            Bytes::from(serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec()))
        } else {
            Bytes::new()
        };

        let mut upstream_req = Request::new(Full::new(payload));
        *upstream_req.method_mut() = method.clone();
        *upstream_req.uri_mut() = uri;
        *upstream_req.headers_mut() = filter_forward_headers(method, inbound_headers);

        debug!(
            "Forwarding to: {} with headers {:?}",
            target,
            upstream_req.headers()
        );

        let exchange = async {
            let upstream_response =
                self.client
                    .request(upstream_req)
                    .await
                    .map_err(|source| ForwardError::Request {
                        target: target.to_string(),
                        source,
                    })?;
            let (parts, body) = upstream_response.into_parts();
            let collected = body.collect().await.map_err(|source| ForwardError::Body {
                target: target.to_string(),
                source,
            })?;
            Ok::<_, ForwardError>((parts, collected.to_bytes()))
        };

        let (parts, raw) = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                ForwardError::Timeout {
                    target: target.to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })??,
            None => exchange.await?,
        };

        let decoded: Value =
            serde_json::from_slice(&raw).map_err(|source| ForwardError::InvalidJson {
                target: target.to_string(),
                source,
            })?;
        debug!("Backend response from {}: {} {}", target, parts.status, decoded);

        let body = Bytes::from(serde_json::to_vec(&decoded).unwrap_or_else(|_| raw.to_vec()));

        Ok(BackendResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}
