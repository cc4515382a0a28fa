//! Error types shared across the proxy.

use thiserror::Error;

/// Rejection of a control endpoint request.
///
/// Both variants carry the raw path segment that failed validation so the
/// log line shows exactly what the caller sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("status code not allowed: {0}")]
    InvalidCode(String),
    #[error("invalid delay (use milliseconds between 0 and 600000): {0}")]
    InvalidDelay(String),
}

impl ControlError {
    /// Message returned to the caller in the JSON error body.
    pub fn public_message(&self) -> &'static str {
        match self {
            ControlError::InvalidCode(_) => "Status code not allowed",
            ControlError::InvalidDelay(_) => {
                "Invalid delay (use milliseconds between 0 and 600000)"
            }
        }
    }
}

/// Failure of the single outbound attempt to a backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid forward target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },
    #[error("request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("request to {target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },
    #[error("failed to read response body from {target}: {source}")]
    Body {
        target: String,
        #[source]
        source: hyper::Error,
    },
    #[error("response from {target} is not valid JSON: {source}")]
    InvalidJson {
        target: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to turn an inbound body into a JSON value.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(String),
    #[error("request body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("request body must be a JSON object or array, got {0}")]
    NotContainer(&'static str),
}

/// Malformed path pattern in a rule or routing definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("path pattern must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("path pattern has more than one wildcard segment: {0}")]
    MultipleWildcards(String),
    #[error("wildcard must occupy a whole segment: {0}")]
    PartialWildcard(String),
}
