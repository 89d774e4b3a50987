//! Request extractors shared by all handlers.
//!
//! Handlers list their extractors in check order. Axum runs them left to right, so a route
//! written as `(AuthenticatedSubject, .., JsonObject)` reports 401 before 415, 415 before 406
//! and 406 before any body validation.

use crate::{
    AppState,
    errors::Error,
    types::{ComputerId, PeripheralId, RequestContext},
};
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const COMPUTERS_PATH: &str = "/computers";
pub const PERIPHERALS_PATH: &str = "/peripherals";

/// Header carrying the caller's correlation id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Whether an `Accept` header admits a JSON response. A missing header accepts anything.
pub fn accepts_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT) else {
        return true;
    };
    let Ok(accept) = accept.to_str() else {
        return false;
    };

    accept.split(',').any(|range| {
        let mut parts = range.split(';').map(str::trim);
        let media = parts.next().unwrap_or_default().to_ascii_lowercase();
        let refused = parts.any(|param| {
            param
                .strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        !refused && matches!(media.as_str(), "application/json" | "application/*" | "*/*")
    })
}

/// Whether a `Content-Type` header declares JSON (parameters such as charset are allowed).
pub fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

/// Rejects the request with 406 unless the caller accepts JSON.
#[derive(Debug, Clone, Copy)]
pub struct AcceptsJson;

impl<S: Send + Sync> FromRequestParts<S> for AcceptsJson {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if accepts_json(&parts.headers) {
            Ok(AcceptsJson)
        } else {
            Err(Error::NotAcceptable)
        }
    }
}

/// A JSON object request body, after the 415 and 406 checks.
///
/// Field validation is left to the resource models so that each route can apply its own
/// ordering of checks.
#[derive(Debug, Clone)]
pub struct JsonObject(pub Map<String, Value>);

impl<S: Send + Sync> FromRequest<S> for JsonObject {
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json_content_type(req.headers()) {
            return Err(Error::UnsupportedMediaType);
        }
        if !accepts_json(req.headers()) {
            return Err(Error::NotAcceptable);
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read request body: {e}"),
        })?;
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(object)) => Ok(JsonObject(object)),
            Ok(_) => Err(Error::BadRequest {
                message: "The request body must be a JSON object".to_string(),
            }),
            Err(e) => Err(Error::BadRequest {
                message: format!("The request body is not valid JSON: {e}"),
            }),
        }
    }
}

/// Scheme and authority used to build absolute `self` and `next` links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin(pub String);

impl RequestOrigin {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let proto = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");
        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or("localhost");
        RequestOrigin(format!("{proto}://{host}"))
    }

    pub fn computer_url(&self, id: &ComputerId) -> String {
        format!("{}{COMPUTERS_PATH}/{id}", self.0)
    }

    pub fn peripheral_url(&self, id: &PeripheralId) -> String {
        format!("{}{PERIPHERALS_PATH}/{id}", self.0)
    }

    /// Link to the next page of a collection: `<origin><collection>?cursor=<cursor>`
    pub fn next_page_url(&self, collection: &str, cursor: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(cursor.as_bytes()).collect();
        format!("{}{collection}?cursor={encoded}", self.0)
    }
}

impl FromRequestParts<AppState> for RequestOrigin {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match &state.config.public_url {
            Some(url) => Ok(RequestOrigin(url.as_str().trim_end_matches('/').to_string())),
            None => Ok(RequestOrigin::from_headers(&parts.headers)),
        }
    }
}

/// Correlation id from `x-request-id` when it is a UUID, otherwise a fresh one. The subject is
/// attached by handlers once authentication has run.
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);
        Ok(RequestContext::new(correlation_id, None))
    }
}
