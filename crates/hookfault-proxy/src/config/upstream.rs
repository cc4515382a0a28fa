//! Backend, forwarding and connection pool configuration.

use serde::{Deserialize, Serialize};

/// The two hosts a request can be forwarded to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendsConfig {
    /// Default target for every forwarded request.
    #[serde(default = "default_primary")]
    pub primary: String,
    /// Target for requests whose path contains `route_add_pattern`.
    #[serde(default = "default_routing_service")]
    pub routing_service: String,
    #[serde(default = "default_route_add_pattern")]
    pub route_add_pattern: String,
}

fn default_primary() -> String {
    "https://api.simpliroute.com/".to_string()
}

fn default_routing_service() -> String {
    "http://router-ms.simpliroute.com:8000/".to_string()
}

fn default_route_add_pattern() -> String {
    "/routes/{id}/add/".to_string()
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            routing_service: default_routing_service(),
            route_add_pattern: default_route_add_pattern(),
        }
    }
}

/// Outbound request policy.
///
/// Every forwarded request gets exactly one attempt; failures are never
/// retried.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardingConfig {
    /// Deadline for the whole outbound exchange (send, response head and
    /// body). `0` disables the deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Largest inbound request body accepted for JSON parsing.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ForwardingConfig {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_ms > 0).then(|| std::time::Duration::from_millis(self.timeout_ms))
    }
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_body_bytes() -> usize {
    100 * 1024
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_max_idle_per_host() -> usize {
    100
}

fn default_pool_idle_timeout() -> u64 {
    90
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}

/// Check that a backend base URL is absolute http(s) with a host.
pub(crate) fn validate_backend_url(name: &str, url: &str) -> Result<(), String> {
    let uri: hyper::Uri = url
        .parse()
        .map_err(|e| format!("Invalid URL for backend '{name}': {url} ({e})"))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => {
            return Err(format!(
                "Unsupported scheme '{other}' for backend '{name}'. Currently supported: http, https"
            ))
        }
        None => return Err(format!("Invalid URL format (missing scheme): {url}")),
    }

    if uri.host().map_or(true, str::is_empty) {
        return Err(format!("Backend '{name}' URL has no host: {url}"));
    }
    Ok(())
}
