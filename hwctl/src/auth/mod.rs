//! Bearer token authentication.
//!
//! Callers authenticate with an `Authorization: Bearer <jwt>` header. Tokens are HS256 JWTs signed
//! with `auth.secret_key`; the `sub` claim becomes the caller's [`Subject`](crate::types::Subject),
//! which is recorded as the owner of every computer they create.
//!
//! - [`token`]: minting and verifying tokens
//! - [`current_subject`]: axum extractors yielding the authenticated subject
//!
//! Peripheral routes and (unless `relationships.require_owner` is set) the attach/detach routes
//! do not require a token.

pub mod current_subject;
pub mod token;
