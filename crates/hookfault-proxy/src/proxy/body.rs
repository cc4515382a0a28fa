//! Inbound body decoding.

use crate::error::BodyError;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::CONTENT_TYPE;
use hyper::HeaderMap;
use serde_json::{Map, Value};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// `application/json`, ignoring parameters and case.
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Decode the request body into the value that gets forwarded.
///
/// Bodies without a JSON content type are not read and become `{}`, as does
/// an empty JSON body. Only an object or array is accepted at the top level.
pub async fn read_json_body<B>(headers: &HeaderMap, body: B, limit: usize) -> Result<Value, BodyError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    if !is_json_content_type(headers) {
        return Ok(Value::Object(Map::new()));
    }

    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.downcast_ref::<LengthLimitError>().is_some() {
            BodyError::TooLarge { limit }
        } else {
            BodyError::Read(e.to_string())
        }
    })?;

    let bytes = collected.to_bytes();
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    match serde_json::from_slice(&bytes)? {
        value @ (Value::Object(_) | Value::Array(_)) => Ok(value),
        other => Err(BodyError::NotContainer(json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
