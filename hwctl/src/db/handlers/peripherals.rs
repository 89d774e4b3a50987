//! Repository for peripherals and their computer back-reference.

use crate::db::{
    errors::{Result, StoreError},
    handlers::repository::{PAGE_SIZE, Page, Repository},
    models::peripherals::{COMPUTER, PeripheralCreateDBRequest, PeripheralDBResponse, PeripheralUpdateDBRequest, computer_ref_value},
    store::{Cursor, EntityStore, Kind, PropertyFilter, Query},
};
use crate::types::{ComputerId, PeripheralId, abbrev_uuid};
use tracing::{debug, instrument};

/// Page size used when walking every peripheral that references a computer.
const SCAN_BATCH: usize = 100;

/// Filter for listing peripherals
#[derive(Debug, Clone, Default)]
pub struct PeripheralFilter {
    /// Resume after the page that produced this cursor
    pub cursor: Option<Cursor>,
}

impl PeripheralFilter {
    pub fn new(cursor: Option<Cursor>) -> Self {
        Self { cursor }
    }
}

fn attached_to(computer_id: ComputerId) -> PropertyFilter {
    PropertyFilter::eq(COMPUTER, computer_ref_value(Some(computer_id)))
}

pub struct Peripherals<'s> {
    store: &'s dyn EntityStore,
}

impl<'s> Peripherals<'s> {
    pub fn new(store: &'s dyn EntityStore) -> Self {
        Self { store }
    }

    /// Every peripheral whose back-reference names `computer_id`.
    ///
    /// Walks all pages of the query; the result is not limited to one page. Because queries may
    /// be stale, callers that act on an entry must re-read it by key first.
    #[instrument(skip(self), fields(computer_id = %abbrev_uuid(&computer_id)), err)]
    pub async fn list_by_computer(&self, computer_id: ComputerId) -> Result<Vec<PeripheralDBResponse>> {
        let mut peripherals = Vec::new();
        let mut cursor = None;
        loop {
            let query = Query::new().filter(attached_to(computer_id)).limit(SCAN_BATCH).start(cursor);
            let page = self.store.query(Kind::Peripheral, &query).await?;
            for entity in &page.entities {
                peripherals.push(PeripheralDBResponse::from_entity(entity)?);
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!("Found {} peripherals referencing computer", peripherals.len());
        Ok(peripherals)
    }

    /// Unpaginated number of peripherals.
    #[instrument(skip(self), err)]
    pub async fn count(&self) -> Result<u64> {
        self.store.count(Kind::Peripheral, None).await
    }

    /// Move the back-reference of a peripheral from `expected` to `new`.
    ///
    /// The peripheral is re-read by key immediately before the write and left untouched unless
    /// its current reference equals `expected`. The read and the write are not atomic, so a
    /// concurrent writer can still slip in between them (last write wins).
    ///
    /// Only the relationship manager calls this.
    #[instrument(
        skip(self),
        fields(
            peripheral_id = %abbrev_uuid(&id),
            expected = ?expected.as_ref().map(abbrev_uuid),
            new = ?new.as_ref().map(abbrev_uuid)
        ),
        err
    )]
    pub(crate) async fn set_computer_ref(
        &self,
        id: PeripheralId,
        expected: Option<ComputerId>,
        new: Option<ComputerId>,
    ) -> Result<RefUpdate> {
        let mut peripheral = self.get_by_id(id).await?.ok_or(StoreError::NotFound)?;
        if peripheral.computer != expected {
            return Ok(RefUpdate::Unchanged(peripheral));
        }
        if peripheral.computer == new {
            return Ok(RefUpdate::Applied(peripheral));
        }

        peripheral.computer = new;
        self.store.put(Kind::Peripheral, &peripheral.to_entity()).await?;
        Ok(RefUpdate::Applied(peripheral))
    }
}

/// Outcome of [`Peripherals::set_computer_ref`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RefUpdate {
    /// The reference now holds the requested value
    Applied(PeripheralDBResponse),
    /// The reference did not hold the expected value; nothing was written
    Unchanged(PeripheralDBResponse),
}

#[async_trait::async_trait]
impl<'s> Repository for Peripherals<'s> {
    type CreateRequest = PeripheralCreateDBRequest;
    type UpdateRequest = PeripheralUpdateDBRequest;
    type Response = PeripheralDBResponse;
    type Id = PeripheralId;
    type Filter = PeripheralFilter;

    #[instrument(skip(self, request), fields(peripheral_type = %request.peripheral_type), err)]
    async fn create(&self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let entity = self.store.insert(Kind::Peripheral, request.to_properties()).await?;
        PeripheralDBResponse::from_entity(&entity)
    }

    #[instrument(skip(self), fields(peripheral_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: Self::Id) -> Result<Option<Self::Response>> {
        match self.store.get(Kind::Peripheral, id).await? {
            Some(entity) => Ok(Some(PeripheralDBResponse::from_entity(&entity)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(has_cursor = filter.cursor.is_some()), err)]
    async fn list(&self, filter: &Self::Filter) -> Result<Page<Self::Response>> {
        let query = Query::new().limit(PAGE_SIZE).start(filter.cursor.clone());
        let page = self.store.query(Kind::Peripheral, &query).await?;
        let items = page
            .entities
            .iter()
            .map(PeripheralDBResponse::from_entity)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { items, next: page.next })
    }

    #[instrument(skip(self), fields(peripheral_id = %abbrev_uuid(&id)), err)]
    async fn delete(&self, id: Self::Id) -> Result<bool> {
        self.store.delete(Kind::Peripheral, id).await
    }

    /// Update descriptive fields, preserving the back-reference read just before the write.
    ///
    /// The read and the write are not atomic, so a reference cleared in between is written back.
    /// Callers that can race a cascade delete follow up with
    /// [`RelationshipManager::repair_dangling_reference`](crate::relationships::RelationshipManager::repair_dangling_reference).
    #[instrument(skip(self, request), fields(peripheral_id = %abbrev_uuid(&id)), err)]
    async fn update(&self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let current = self.get_by_id(id).await?.ok_or(StoreError::NotFound)?;
        let updated = current.apply(request);
        self.store.put(Kind::Peripheral, &updated.to_entity()).await?;
        Ok(updated)
    }
}
