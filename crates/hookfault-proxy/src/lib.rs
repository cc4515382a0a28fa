//! Hookfault: a reverse proxy that sits between a webhook-producing API and
//! its consumers and injects simulated failures.
//!
//! Requests are delayed by the configured amount, then either answered with
//! a simulated error (when the simulated status is an error code and a fault
//! rule allows it) or forwarded to one of two backends and relayed back.

pub mod config;
pub mod error;
pub mod fault;
pub mod matcher;
pub mod metrics;
pub mod proxy;
pub mod response;
pub mod routing;

pub use config::Config;
pub use error::{BodyError, ControlError, ForwardError, PatternError};
pub use fault::{FaultSnapshot, FaultState};
pub use matcher::{FaultRule, PathPattern, RuleMatcher};
pub use proxy::{ProxyEngine, ProxyServer};
pub use routing::{Backend, RouteResolver};
