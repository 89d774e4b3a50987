//! Entity store adapter.
//!
//! The entity store is a schemaless, paginated key-value document store. Every entity belongs to
//! a [`Kind`], is keyed by a store-assigned UUID and carries an untyped property map. The
//! repositories in [`crate::db::handlers`] are the only code that turns property maps into typed
//! records.
//!
//! # Consistency
//!
//! Key lookups ([`EntityStore::get`]) observe every completed write to the same key. Property
//! queries ([`EntityStore::query`]) are allowed to be stale: callers that need the current value
//! of an entity found through a query must re-read it by key.
//!
//! # Pagination
//!
//! Queries return results in the store's native order (ascending key) and hand back an opaque
//! [`Cursor`] when more results exist. Cursors are produced and interpreted only by the store
//! implementation; everything above this module passes them through untouched.
//!
//! # Backends
//!
//! - [`memory::MemoryStore`]: in-process ordered maps, used by default and by the test suite
//! - [`postgres::PostgresStore`]: a single JSONB `entities` table managed by sqlx migrations

pub mod memory;
pub mod postgres;

use crate::db::errors::{Result, StoreError};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Untyped entity payload.
pub type Properties = serde_json::Map<String, Value>;

/// Entity kinds held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Computer,
    Peripheral,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Computer => "computer",
            Kind::Peripheral => "peripheral",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored entity: its key plus the raw property map.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub key: Uuid,
    pub properties: Properties,
}

impl Entity {
    pub fn new(key: Uuid, properties: Properties) -> Self {
        Self { key, properties }
    }
}

/// Opaque continuation token marking a position in a query's result stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keyset cursor shared by the bundled backends: the last key handed out, base64url encoded.
fn encode_key_cursor(key: &Uuid) -> Cursor {
    Cursor(URL_SAFE_NO_PAD.encode(key.as_bytes()))
}

fn decode_key_cursor(cursor: &Cursor) -> Result<Uuid> {
    let bytes = URL_SAFE_NO_PAD.decode(cursor.as_str()).map_err(|_| StoreError::InvalidCursor)?;
    Uuid::from_slice(&bytes).map_err(|_| StoreError::InvalidCursor)
}

/// Single-property equality filter.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub name: String,
    pub value: Value,
}

impl PropertyFilter {
    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, properties: &Properties) -> bool {
        // An absent property compares equal to null, mirroring document store semantics
        properties.get(&self.name).unwrap_or(&Value::Null) == &self.value
    }
}

/// Parameters of a single query round trip.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filter: Option<PropertyFilter>,
    pub limit: Option<usize>,
    pub cursor: Option<Cursor>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: PropertyFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start(mut self, cursor: Option<Cursor>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub entities: Vec<Entity>,
    /// Present iff more results exist after this page.
    pub next: Option<Cursor>,
}

/// Abstract paginated entity store.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync + 'static {
    /// Look up an entity by key.
    async fn get(&self, kind: Kind, key: Uuid) -> Result<Option<Entity>>;

    /// Run a filtered, optionally limited query starting after `query.cursor`.
    async fn query(&self, kind: Kind, query: &Query) -> Result<QueryPage>;

    /// Count every entity matching the filter, ignoring pagination.
    async fn count(&self, kind: Kind, filter: Option<&PropertyFilter>) -> Result<u64>;

    /// Store a new entity under a freshly assigned key.
    async fn insert(&self, kind: Kind, properties: Properties) -> Result<Entity>;

    /// Replace the full property map stored under `entity.key` (last write wins).
    async fn put(&self, kind: Kind, entity: &Entity) -> Result<()>;

    /// Delete an entity. Returns false when nothing was stored under the key.
    async fn delete(&self, kind: Kind, key: Uuid) -> Result<bool>;
}
