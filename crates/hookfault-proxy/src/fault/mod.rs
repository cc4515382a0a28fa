//! Fault injection: the shared fault state, the allow-lists that guard it,
//! and the decision of whether a request gets a simulated error.

mod state;

pub use state::{FaultSnapshot, FaultState};

use crate::error::ControlError;
use crate::matcher::FaultRule;
use crate::proxy::headers::{VALUE_ERROR, X_HOOKFAULT_FAULT, X_HOOKFAULT_RULE_ID};
use crate::response::JsonResponseBuilder;
use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use std::time::Duration;

/// Status codes that can be simulated. `200` is also accepted by the status
/// control endpoint and means "no fault".
pub const ERROR_CODES: [u16; 7] = [404, 408, 429, 500, 502, 503, 504];

pub const MAX_DELAY_MS: u64 = 600_000;

pub fn validate_status(code: u16) -> Result<(), ControlError> {
    if code == 200 || ERROR_CODES.contains(&code) {
        Ok(())
    } else {
        Err(ControlError::InvalidCode(code.to_string()))
    }
}

pub fn validate_delay(delay_ms: u64) -> Result<(), ControlError> {
    if delay_ms <= MAX_DELAY_MS {
        Ok(())
    } else {
        Err(ControlError::InvalidDelay(delay_ms.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultDecision {
    None,
    Error { status: u16, rule_id: String },
}

/// Fault iff a rule matched and the simulated status is one of its codes.
pub fn decide_fault(status: u16, rule: Option<&FaultRule>) -> FaultDecision {
    match rule {
        Some(rule) if status != 200 && rule.is_eligible(status) => FaultDecision::Error {
            status,
            rule_id: rule.id.clone(),
        },
        _ => FaultDecision::None,
    }
}

pub async fn apply_delay(delay_ms: u64) {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

/// Body naming the simulated mock and the path exactly as received.
pub fn simulated_fault_response(status: u16, path: &str, rule_id: &str) -> Response<Full<Bytes>> {
    JsonResponseBuilder::from_u16(status)
        .set_header(&X_HOOKFAULT_FAULT, &VALUE_ERROR)
        .header(&X_HOOKFAULT_RULE_ID, rule_id)
        .build_json(&serde_json::json!({
            "mensaje": format!("Simulated mock with status {status}"),
            "ruta": path,
        }))
}
