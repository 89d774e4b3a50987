//! HTTP API: route handlers, request extractors and wire models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`extractors`]**: content negotiation, JSON bodies, request origin
//! - **[`models`]**: request/response data structures
//!
//! # API Structure
//!
//! - **Computers** (`/computers/*`): owner-scoped, bearer token required
//! - **Peripherals** (`/peripherals/*`): shared inventory, no token required
//! - **Relationships** (`/computers/{computer_id}/peripherals/{peripheral_id}`): attach and detach
//!
//! OpenAPI documentation is served at `/docs` (see [`crate::openapi`]).

pub mod extractors;
pub mod handlers;
pub mod models;
