//! Attribute checks for write requests.

use crate::errors::Error;
use serde_json::{Map, Value};

pub const IDEMPOTENT_ATTRIBUTES: &str = "The request object attempted to specify one or more idempotent attributes";
pub const MISSING_ATTRIBUTES: &str = "The request object is missing at least one of the required attributes";
pub const NO_MODIFIABLE_ATTRIBUTE: &str = "The request object contains no modifiable attribute";

/// Attributes clients may never write on any resource
pub const SERVER_ASSIGNED: &[&str] = &["id", "self"];

fn bad_request(message: &str) -> Error {
    Error::BadRequest {
        message: message.to_string(),
    }
}

/// A non-empty string value for `name`, if the body carries one.
pub fn string_attribute(body: &Map<String, Value>, name: &str) -> Option<String> {
    match body.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Fails if the body sets any of `forbidden` to a non-null value.
pub fn reject_forbidden(body: &Map<String, Value>, forbidden: &[&str]) -> Result<(), Error> {
    if forbidden.iter().any(|name| body.get(*name).is_some_and(|v| !v.is_null())) {
        return Err(bad_request(IDEMPOTENT_ATTRIBUTES));
    }
    Ok(())
}

/// Every attribute in `required` as a non-empty string, in the same order.
pub fn require_all(body: &Map<String, Value>, required: &[&str]) -> Result<Vec<String>, Error> {
    required
        .iter()
        .map(|name| string_attribute(body, name).ok_or_else(|| bad_request(MISSING_ATTRIBUTES)))
        .collect()
}

/// Each attribute in `modifiable` that the body sets; fails if it sets none.
pub fn require_any(body: &Map<String, Value>, modifiable: &[&str]) -> Result<Vec<Option<String>>, Error> {
    let values: Vec<_> = modifiable.iter().map(|name| string_attribute(body, name)).collect();
    if values.iter().all(Option::is_none) {
        return Err(bad_request(NO_MODIFIABLE_ATTRIBUTE));
    }
    Ok(values)
}
