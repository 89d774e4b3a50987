//! Repository for computers.

use crate::db::{
    errors::{Result, StoreError},
    handlers::repository::{PAGE_SIZE, Page, Repository},
    models::computers::{ComputerCreateDBRequest, ComputerDBResponse, ComputerUpdateDBRequest, OWNER},
    store::{Cursor, EntityStore, Kind, PropertyFilter, Query},
};
use crate::types::{ComputerId, Subject, abbrev_uuid};
use tracing::instrument;

/// Filter for listing computers
#[derive(Debug, Clone, Default)]
pub struct ComputerFilter {
    /// Restrict to computers owned by this subject
    pub owner: Option<Subject>,
    /// Resume after the page that produced this cursor
    pub cursor: Option<Cursor>,
}

impl ComputerFilter {
    pub fn new(owner: Option<Subject>, cursor: Option<Cursor>) -> Self {
        Self { owner, cursor }
    }
}

fn owner_filter(owner: &Subject) -> PropertyFilter {
    PropertyFilter::eq(OWNER, owner.as_str())
}

pub struct Computers<'s> {
    store: &'s dyn EntityStore,
}

impl<'s> Computers<'s> {
    pub fn new(store: &'s dyn EntityStore) -> Self {
        Self { store }
    }

    /// Unpaginated number of computers, optionally restricted to one owner.
    #[instrument(skip(self), err)]
    pub async fn count(&self, owner: Option<&Subject>) -> Result<u64> {
        let filter = owner.map(owner_filter);
        self.store.count(Kind::Computer, filter.as_ref()).await
    }
}

#[async_trait::async_trait]
impl<'s> Repository for Computers<'s> {
    type CreateRequest = ComputerCreateDBRequest;
    type UpdateRequest = ComputerUpdateDBRequest;
    type Response = ComputerDBResponse;
    type Id = ComputerId;
    type Filter = ComputerFilter;

    #[instrument(skip(self, request), fields(owner = %request.owner), err)]
    async fn create(&self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let entity = self.store.insert(Kind::Computer, request.to_properties()).await?;
        ComputerDBResponse::from_entity(&entity)
    }

    #[instrument(skip(self), fields(computer_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Self::Response>> {
        match self.store.get(Kind::Computer, id).await? {
            Some(entity) => Ok(Some(ComputerDBResponse::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(owner = ?filter.owner, has_cursor = filter.cursor.is_some()), err)]
    async fn list(&self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let mut query = Query::new().limit(PAGE_SIZE).start(filter.cursor.clone());
        if let Some(owner) = &filter.owner {
            query = query.filter(owner_filter(owner));
        }

        let page = self.store.query(Kind::Computer, &query).await?;
        let items = page
            .entities
            .iter()
            .map(ComputerDBResponse::from_entity)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { items, next: page.next })
    }

    #[instrument(skip(self), fields(computer_id = %abbrev_uuid(&id)), err)]
    async fn delete(&self, id: Self::Id) -> Result<bool> {
        self.store.delete(Kind::Computer, id).await
    }

    /// Update the descriptive fields of a computer owned by `request.owner`.
    ///
    /// A computer owned by someone else is reported as not found.
    #[instrument(skip(self, request), fields(computer_id = %abbrev_uuid(&id), owner = %request.owner), err)]
    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let current = self.get_by_id(id).await?.ok_or(StoreError::NotFound)?;
        if !current.is_owned_by(&request.owner) {
            return Err(StoreError::NotFound);
        }

        let updated = current.apply(request);
        self.store.put(Kind::Computer, &updated.to_entity()).await?;
        Ok(updated)
    }
}
