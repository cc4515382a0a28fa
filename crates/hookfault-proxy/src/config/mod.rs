//! Configuration types for the Hookfault proxy.

mod listen;
mod rules;
mod upstream;

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::fault::{validate_delay, validate_status, ERROR_CODES};
use crate::matcher::PathPattern;

// Re-export all types for library consumers
pub use listen::{ListenConfig, MetricsConfig};
pub use rules::{default_rules, FaultConfig, RuleConfig};
pub use upstream::{BackendsConfig, ConnectionPoolConfig, ForwardingConfig};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    #[serde(default)]
    pub fault: FaultConfig,
    /// Ordered fault-eligibility rules; first match wins.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            backends: BackendsConfig::default(),
            forwarding: ForwardingConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            fault: FaultConfig::default(),
            rules: default_rules(),
            metrics: None,
        }
    }
}

impl Config {
    /// Load without validating, so CLI overrides can be applied first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, anyhow::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        upstream::validate_backend_url("primary", &self.backends.primary)
            .map_err(|e| anyhow::anyhow!(e))?;
        upstream::validate_backend_url("routing_service", &self.backends.routing_service)
            .map_err(|e| anyhow::anyhow!(e))?;
        PathPattern::parse(&self.backends.route_add_pattern)
            .context("Invalid backends.route_add_pattern")?;

        validate_status(self.fault.initial_status).context("Invalid fault.initial_status")?;
        validate_delay(self.fault.initial_delay_ms).context("Invalid fault.initial_delay_ms")?;

        self.validate_rules()?;

        if let Some(ref metrics) = self.metrics {
            if metrics.port == self.listen.port && metrics.port != 0 {
                anyhow::bail!(
                    "metrics.port ({}) must differ from listen.port",
                    metrics.port
                );
            }
        }

        Ok(())
    }

    fn validate_rules(&self) -> Result<(), anyhow::Error> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            if rule.id.trim().is_empty() {
                anyhow::bail!("Rule id must not be empty (path '{}')", rule.path);
            }
            if !seen.insert(rule.id.as_str()) {
                anyhow::bail!("Duplicate rule id '{}'", rule.id);
            }
            if hyper::Method::from_bytes(rule.method.to_ascii_uppercase().as_bytes()).is_err() {
                anyhow::bail!("Invalid method '{}' in rule '{}'", rule.method, rule.id);
            }
            PathPattern::parse(&rule.path)
                .with_context(|| format!("Invalid path in rule '{}'", rule.id))?;
            if rule.codes.is_empty() {
                anyhow::bail!("Rule '{}' lists no status codes", rule.id);
            }
            if let Some(code) = rule.codes.iter().find(|c| !ERROR_CODES.contains(c)) {
                anyhow::bail!(
                    "Rule '{}' lists status {} which is not a simulated error code ({:?})",
                    rule.id,
                    code,
                    ERROR_CODES
                );
            }
        }
        Ok(())
    }
}
