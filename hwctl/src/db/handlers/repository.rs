//! Base repository trait for entity store operations.

use crate::db::errors::Result;
use crate::db::store::Cursor;

/// Number of entities returned per page by paginated list operations.
pub const PAGE_SIZE: usize = 5;

/// One page of typed results plus the opaque cursor for the next page, if any.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

/// Base repository trait providing common entity operations
///
/// A repository is the data access layer for one entity kind. It owns the conversion between
/// the store's schemaless property maps and the kind's typed record, and has no knowledge of
/// other kinds.
///
/// This trait has separate associated types for create requests, update requests, and responses.
#[async_trait::async_trait]
pub trait Repository {
    /// The request type for creating entities
    type CreateRequest;

    /// The request type for updating entities
    type UpdateRequest;

    /// The response/DTO type returned by operations
    type Response;

    /// The identifier type for lookups
    type Id: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    /// Create a new entity
    async fn create(&self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// Get an entity by ID
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// List one page of entities matching the filter
    async fn list(&self, filter: &Self::Filter) -> Result<Page<Self::Response>>;

    /// Delete an entity by ID
    async fn delete(&self, id: Self::Id) -> Result<bool>;

    /// Update an entity by ID
    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
