//! Control endpoints that reconfigure the fault state.
//!
//! - `POST /set-status/:code`
//! - `POST /set-delay/:ms`
//!
//! Paths are matched case-insensitively, with or without a trailing slash.
//! Any other method on these paths is proxied like any other request.

use crate::error::ControlError;
use crate::fault::FaultState;
use crate::metrics;
use crate::response::{error_response, json_response};
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRoute<'a> {
    SetStatus(&'a str),
    SetDelay(&'a str),
}

impl<'a> ControlRoute<'a> {
    /// Recognize a control request from its method and query-less path.
    pub fn parse(method: &Method, path: &'a str) -> Option<Self> {
        if *method != Method::POST {
            return None;
        }
        let rest = path.strip_prefix('/')?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let segments: Vec<&str> = rest.split('/').collect();

        match segments.as_slice() {
            [name, value] if !value.is_empty() && name.eq_ignore_ascii_case("set-status") => {
                Some(ControlRoute::SetStatus(*value))
            }
            [name, value] if !value.is_empty() && name.eq_ignore_ascii_case("set-delay") => {
                Some(ControlRoute::SetDelay(*value))
            }
            _ => None,
        }
    }
}

/// Leading decimal integer of `raw`, ignoring leading whitespace and any
/// trailing garbage (`"503abc"` is 503). `None` without leading digits or on
/// overflow.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if negative { -value } else { value })
}

pub fn handle_control(route: ControlRoute<'_>, state: &FaultState) -> Response<Full<Bytes>> {
    let result = match route {
        ControlRoute::SetStatus(raw) => set_status(raw, state),
        ControlRoute::SetDelay(raw) => set_delay(raw, state),
    };

    match result {
        Ok(message) => {
            let snapshot = state.snapshot();
            metrics::set_fault_state(snapshot.status, snapshot.delay_ms);
            json_response(StatusCode::OK, &serde_json::json!({ "mensaje": message }))
        }
        Err(e) => {
            warn!("Rejected control request: {}", e);
            error_response(StatusCode::BAD_REQUEST, e.public_message())
        }
    }
}

fn set_status(raw: &str, state: &FaultState) -> Result<String, ControlError> {
    let code = parse_leading_int(raw)
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| ControlError::InvalidCode(raw.to_string()))?;
    state.set_status(code)?;
    info!("Simulated status updated to {}", code);
    Ok(format!("Simulated status updated to {code}"))
}

fn set_delay(raw: &str, state: &FaultState) -> Result<String, ControlError> {
    let delay_ms = parse_leading_int(raw)
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| ControlError::InvalidDelay(raw.to_string()))?;
    state.set_delay(delay_ms)?;
    info!("Simulated delay updated to {}ms", delay_ms);
    Ok(format!("Simulated delay updated to {delay_ms}ms"))
}
