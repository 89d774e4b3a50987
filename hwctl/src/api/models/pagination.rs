//! Cursor pagination for list endpoints.
//!
//! Pages hold at most [`PAGE_SIZE`](crate::db::handlers::PAGE_SIZE) items. When more exist, the
//! envelope carries a `next` URL with an opaque `cursor` query parameter; following it resumes
//! exactly after the last item of the current page.

use crate::db::store::Cursor;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for list endpoints
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Opaque cursor taken from a previous page's `next` link
    pub cursor: Option<String>,
}

impl ListQuery {
    pub fn cursor(&self) -> Option<Cursor> {
        self.cursor.as_deref().filter(|c| !c.is_empty()).map(Cursor::new)
    }
}

/// One page of a collection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T: ToSchema> {
    /// The items on this page
    pub items: Vec<T>,
    /// Number of items in the whole collection visible to the caller
    pub count: u64,
    /// Absolute URL of the next page, present only when more items exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl<T: ToSchema> ListResponse<T> {
    pub fn new(items: Vec<T>, count: u64, next: Option<String>) -> Self {
        Self { items, count, next }
    }
}
