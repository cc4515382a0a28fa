//! Header rules for the forward and relay legs.
//!
//! Both directions are pure `HeaderMap -> HeaderMap` functions so the
//! exclusion and injection rules can be tested without a network.

use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, Method};

pub static X_HOOKFAULT_FAULT: HeaderName = HeaderName::from_static("x-hookfault-fault");
pub static X_HOOKFAULT_RULE_ID: HeaderName = HeaderName::from_static("x-hookfault-rule-id");

pub static VALUE_ERROR: HeaderValue = HeaderValue::from_static("error");
pub static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Never copied from the inbound request.
pub const EXCLUDED_REQUEST_HEADERS: [&str; 3] = ["host", "connection", "content-length"];

/// Also dropped on the forward leg: the body is re-serialized, so framing and
/// content coding are negotiated by the outbound client, not the caller.
pub const TRANSPORT_REQUEST_HEADERS: [&str; 2] = ["transfer-encoding", "accept-encoding"];

/// Not relayed from the backend response. Type and length are rewritten for
/// the re-encoded JSON body; the rest are hop-by-hop.
pub const EXCLUDED_RESPONSE_HEADERS: [&str; 10] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "content-length",
    "content-type",
    "content-encoding",
];

/// Methods whose parsed body is forwarded.
pub fn method_has_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Headers for the outbound request.
///
/// Copies every inbound header except the excluded ones; for body-bearing
/// methods a missing `content-type` becomes `application/json`.
pub fn filter_forward_headers(method: &Method, inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound.iter() {
        let key = name.as_str();
        if EXCLUDED_REQUEST_HEADERS.contains(&key) || TRANSPORT_REQUEST_HEADERS.contains(&key) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    if method_has_body(method) && !outbound.contains_key(CONTENT_TYPE) {
        outbound.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
    }
    outbound
}

/// Backend headers that survive onto the relayed response.
pub fn filter_relay_headers(backend: &HeaderMap) -> HeaderMap {
    let mut relayed = HeaderMap::with_capacity(backend.len());
    for (name, value) in backend.iter() {
        if !EXCLUDED_RESPONSE_HEADERS.contains(&name.as_str()) {
            relayed.append(name.clone(), value.clone());
        }
    }
    relayed
}
