//! Repository implementations for entity store access.
//!
//! Each repository:
//! - Borrows the shared [`EntityStore`](crate::db::store::EntityStore)
//! - Provides strongly-typed CRUD operations for one entity kind
//! - Converts property maps into the records in [`crate::db::models`]
//! - Knows nothing about other kinds; cross-kind rules live in [`crate::relationships`]
//!
//! # Available Repositories
//!
//! - [`Computers`]: owner-scoped computer records
//! - [`Peripherals`]: shared peripheral inventory and its computer back-reference
//!
//! # Common Pattern
//!
//! ```ignore
//! use hwctl::db::handlers::{Computers, Repository};
//!
//! async fn example(state: &hwctl::AppState, id: hwctl::ComputerId) -> hwctl::db::errors::Result<()> {
//!     let repo = Computers::new(state.store.as_ref());
//!     if let Some(computer) = repo.get_by_id(id).await? {
//!         println!("{} {}", computer.manufacturer, computer.model);
//!     }
//!     Ok(())
//! }
//! ```

pub mod computers;
pub mod peripherals;
pub mod repository;

pub use computers::Computers;
pub use peripherals::Peripherals;
pub use repository::{PAGE_SIZE, Page, Repository};
