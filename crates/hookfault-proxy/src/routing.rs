//! Backend selection by path shape.

use crate::config::BackendsConfig;
use crate::error::PatternError;
use crate::matcher::PathPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Primary,
    RoutingService,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Primary => "primary",
            Backend::RoutingService => "routing_service",
        }
    }
}

/// Picks the primary webhook API unless the request target (query included)
/// contains the add-visit shape, in which case the routing service gets the
/// request. The method plays no part in the decision.
#[derive(Debug, Clone)]
pub struct RouteResolver {
    primary: String,
    routing_service: String,
    route_add: PathPattern,
}

impl RouteResolver {
    pub fn new(config: &BackendsConfig) -> Result<Self, PatternError> {
        Ok(Self {
            primary: strip_trailing_slash(&config.primary).to_string(),
            routing_service: strip_trailing_slash(&config.routing_service).to_string(),
            route_add: PathPattern::parse(&config.route_add_pattern)?,
        })
    }

    pub fn select(&self, path_and_query: &str) -> Backend {
        if self.route_add.found_in(path_and_query) {
            Backend::RoutingService
        } else {
            Backend::Primary
        }
    }

    /// Base URL without its trailing slash.
    pub fn base_url(&self, backend: Backend) -> &str {
        match backend {
            Backend::Primary => &self.primary,
            Backend::RoutingService => &self.routing_service,
        }
    }

    /// Full forward target: base URL followed by the path and query exactly
    /// as received.
    pub fn resolve(&self, path_and_query: &str) -> (Backend, String) {
        let backend = self.select(path_and_query);
        let target = format!("{}{}", self.base_url(backend), path_and_query);
        (backend, target)
    }
}

fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}
