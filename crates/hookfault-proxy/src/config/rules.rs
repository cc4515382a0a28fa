//! Fault-eligibility rule and initial fault state configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RuleConfig {
    pub id: String,
    pub method: String,
    /// Segment pattern, e.g. `/routes/{id}/add/`.
    pub path: String,
    /// Simulated status codes this rule lets through.
    pub codes: Vec<u16>,
}

/// Rules applied when the config file does not list any.
pub fn default_rules() -> Vec<RuleConfig> {
    const TRANSIENT: [u16; 6] = [408, 429, 500, 502, 503, 504];

    vec![
        RuleConfig {
            id: "visits-upsert".to_string(),
            method: "POST".to_string(),
            path: "/v1/routes/visits/upsert/".to_string(),
            codes: TRANSIENT.to_vec(),
        },
        RuleConfig {
            id: "route-add-visit".to_string(),
            method: "POST".to_string(),
            path: "/routes/{id}/add/".to_string(),
            codes: [&[404][..], &TRANSIENT[..]].concat(),
        },
        RuleConfig {
            id: "visits-create".to_string(),
            method: "POST".to_string(),
            path: "/v1/routes/visits/".to_string(),
            codes: TRANSIENT.to_vec(),
        },
    ]
}

/// Fault state at process start.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FaultConfig {
    #[serde(default = "default_initial_status")]
    pub initial_status: u16,
    #[serde(default)]
    pub initial_delay_ms: u64,
}

fn default_initial_status() -> u16 {
    200
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            initial_status: default_initial_status(),
            initial_delay_ms: 0,
        }
    }
}
