//! API request and response data models.
//!
//! Request bodies arrive as raw JSON objects (see [`crate::api::extractors::JsonObject`]) and
//! are validated here into typed requests, so that each route controls the order in which
//! forbidden and missing attributes are reported. Responses add absolute `self` links and, for
//! computers, the `peripherals` attached to them.
//!
//! - [`computers`]: computer requests and responses
//! - [`peripherals`]: peripheral requests and responses
//! - [`pagination`]: cursor query parameters and the list envelope
//! - [`validation`]: attribute checks and their client-facing messages

pub mod computers;
pub mod pagination;
pub mod peripherals;
pub mod validation;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Reference to another resource: its id and absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    #[schema(value_type = String, format = "uuid")]
    pub id: Uuid,
    /// Absolute URL of the resource
    #[serde(rename = "self")]
    pub self_link: String,
}
