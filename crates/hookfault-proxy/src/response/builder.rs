use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::http::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Response, StatusCode};
use serde::Serialize;

use crate::proxy::headers::APPLICATION_JSON;

/// Builds JSON responses whose `Content-Type` and `Content-Length` are always
/// set by the builder, overriding anything merged in.
pub struct JsonResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
}

impl JsonResponseBuilder {
    pub fn new(status_code: StatusCode) -> Self {
        JsonResponseBuilder {
            status: status_code,
            headers: Default::default(),
        }
    }

    /// Status from a raw code; unknown codes degrade to 500.
    pub fn from_u16(status: u16) -> Self {
        Self::new(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
    }

    pub fn set_header(mut self, name: &HeaderName, value: &HeaderValue) -> Self {
        self.headers.insert(name.clone(), value.clone());
        self
    }

    pub fn header(mut self, name: &HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name.clone(), value);
        }
        self
    }

    pub fn merge_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    pub fn build_json<T: Serialize>(self, body: &T) -> Response<Full<Bytes>> {
        let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
        self.build_bytes(Bytes::from(payload))
    }

    /// Finish with an already serialized JSON payload.
    pub fn build_bytes(self, payload: Bytes) -> Response<Full<Bytes>> {
        let content_length = HeaderValue::from(payload.len());

        let mut response = Response::new(Full::new(payload));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.extend(self.headers);
        headers.insert(CONTENT_TYPE, APPLICATION_JSON.clone());
        headers.insert(CONTENT_LENGTH, content_length);
        response
    }
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    JsonResponseBuilder::new(status).build_json(body)
}

/// `{"error": "<message>"}` with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}
