//! HTTP request handlers, one module per resource.
//!
//! - [`computers`]: owner-scoped computer CRUD with cascading delete
//! - [`peripherals`]: peripheral CRUD
//! - [`relationships`]: attaching peripherals to computers and detaching them
//!
//! Handlers return [`crate::errors::Error`], which renders the client-facing status and body.

pub mod computers;
pub mod peripherals;
pub mod relationships;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

/// 405 with an explicit `Allow` list, used as the method fallback of each route.
pub fn method_not_allowed(allow: &'static str) -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, allow)]).into_response()
}
