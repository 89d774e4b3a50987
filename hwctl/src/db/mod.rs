//! Data access layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ Relationship manager │  (crate::relationships - cross-kind rules)
//! └──────────┬───────────┘
//!            │
//!            ↓
//! ┌──────────────────────┐
//! │     Repositories     │  (db::handlers - typed CRUD per kind)
//! └──────────┬───────────┘
//!            │
//!            ↓
//! ┌──────────────────────┐
//! │        Models        │  (db::models - typed records)
//! └──────────┬───────────┘
//!            │
//!            ↓
//! ┌──────────────────────┐
//! │     Entity store     │  (db::store - memory or PostgreSQL)
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`store`]: The abstract paginated entity store and its backends
//! - [`handlers`]: Repository implementations for computers and peripherals
//! - [`models`]: Typed records and request types
//! - [`errors`]: Store-level error types
//!
//! # Migrations
//!
//! The PostgreSQL backend's schema lives in `migrations/` and is applied on startup through
//! [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
pub mod store;
