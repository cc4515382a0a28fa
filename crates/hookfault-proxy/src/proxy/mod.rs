//! Proxy server module.
//!
//! # Module Structure
//!
//! - `server` - ProxyServer struct and main run loop
//! - `handler` - Per-request pipeline (delay, fault check, forward)
//! - `control` - `set-status` / `set-delay` endpoints
//! - `forwarding` - Single-attempt forwarding to a backend
//! - `headers` - Header filtering for the forward and relay legs
//! - `body` - Inbound JSON body decoding
//! - `client` - HTTP client creation and configuration
//! - `network` - Listener creation

mod body;
mod client;
mod control;
mod forwarding;
mod handler;
pub mod headers;
mod network;
mod server;

#[cfg(test)]
mod tests;

pub use body::read_json_body;
pub use client::{create_http_client, HttpClient};
pub use control::{handle_control, parse_leading_int, ControlRoute};
pub use forwarding::{BackendResponse, RequestForwarder};
pub use handler::{Handled, Outcome, ProxyEngine};
pub use network::create_listener;
pub use server::ProxyServer;
