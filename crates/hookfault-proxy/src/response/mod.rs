//! JSON response construction.

mod builder;

pub use builder::{error_response, json_response, JsonResponseBuilder};
