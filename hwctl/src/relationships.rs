//! Relationship manager: the only code that changes a peripheral's computer reference.
//!
//! A computer owns zero or more peripherals, but the relationship is persisted only as the
//! `computer` back-reference on each peripheral. Membership is discovered by querying
//! peripherals, so every rule that spans both collections lives here:
//!
//! - **attach** sets an unattached peripheral's reference to an existing computer. A peripheral
//!   that is already attached is never re-parented.
//! - **detach** clears the reference, but only when it names the computer the caller targeted.
//! - **cascade delete** clears every reference to a computer and deletes the computer only once
//!   nothing points at it any more.
//!
//! # Consistency
//!
//! The store offers no multi-entity transactions. Each write is preceded by a re-read of the
//! peripheral by key (see [`Peripherals::set_computer_ref`]), which narrows the window for a
//! concurrent writer but does not close it: two attaches racing between the re-read and the
//! write resolve as last-write-wins.
//!
//! Cascade detaches run as an awaited, bounded-parallel batch. Enumeration is repeated until a
//! pass finds nothing left to clear, so peripherals attached while the cascade was running are
//! picked up too. A detach that fails leaves the computer in place; reissuing the delete
//! resumes from whatever was already cleared.

use crate::config::RelationshipsConfig;
use crate::db::{
    errors::StoreError,
    handlers::{Computers, Peripherals, Repository, peripherals::RefUpdate},
    models::{computers::ComputerDBResponse, peripherals::PeripheralDBResponse},
    store::EntityStore,
};
use crate::types::{ComputerId, Operation, PeripheralId, RequestContext, Subject, abbrev_uuid};
use futures::{StreamExt, stream};
use metrics::counter;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum RelationshipError {
    #[error("Computer not found")]
    ComputerNotFound,

    #[error("Peripheral not found")]
    PeripheralNotFound,

    /// The peripheral exists but is not attached to the targeted computer
    #[error("Peripheral is not attached to this computer")]
    NotAttached,

    #[error("Peripheral is already attached to a computer")]
    AlreadyAttached,

    /// The caller does not own the computer
    #[error("Subject is not allowed to {operation} this computer")]
    Forbidden { operation: Operation },

    /// Some detaches failed; the computer was left in place
    #[error("Failed to detach {failed} peripherals; computer was not deleted")]
    CascadeIncomplete { failed: usize },

    /// Peripherals kept being attached faster than the cascade could clear them
    #[error("Peripherals still reference the computer after {passes} detach passes; computer was not deleted")]
    CascadeUnsettled { passes: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, RelationshipError>;

/// Orchestrates attach, detach and cascade delete over the two repositories.
pub struct RelationshipManager<'s> {
    store: &'s dyn EntityStore,
    config: &'s RelationshipsConfig,
}

impl<'s> RelationshipManager<'s> {
    pub fn new(store: &'s dyn EntityStore, config: &'s RelationshipsConfig) -> Self {
        Self { store, config }
    }

    fn computers(&self) -> Computers<'s> {
        Computers::new(self.store)
    }

    fn peripherals(&self) -> Peripherals<'s> {
        Peripherals::new(self.store)
    }

    /// Owner check applied to attach and detach when `require_owner` is set.
    fn check_relationship_owner(&self, ctx: &RequestContext, computer: &ComputerDBResponse, operation: Operation) -> Result<()> {
        if !self.config.require_owner {
            return Ok(());
        }
        match ctx.subject() {
            Some(subject) if computer.is_owned_by(subject) => Ok(()),
            _ => Err(RelationshipError::Forbidden { operation }),
        }
    }

    /// Attach an unattached peripheral to an existing computer.
    #[instrument(
        skip(self, ctx),
        fields(
            correlation_id = %ctx.correlation_id,
            computer_id = %abbrev_uuid(&computer_id),
            peripheral_id = %abbrev_uuid(&peripheral_id)
        ),
        err
    )]
    pub async fn attach(&self, ctx: &RequestContext, computer_id: ComputerId, peripheral_id: PeripheralId) -> Result<PeripheralDBResponse> {
        let peripheral = self
            .peripherals()
            .get_by_id(peripheral_id)
            .await?
            .ok_or(RelationshipError::PeripheralNotFound)?;
        let computer = self
            .computers()
            .get_by_id(computer_id)
            .await?
            .ok_or(RelationshipError::ComputerNotFound)?;
        self.check_relationship_owner(ctx, &computer, Operation::Attach)?;

        if peripheral.is_attached() {
            return Err(RelationshipError::AlreadyAttached);
        }

        match self.peripherals().set_computer_ref(peripheral_id, None, Some(computer_id)).await {
            Ok(RefUpdate::Applied(peripheral)) => {
                counter!("hwctl_attach_total").increment(1);
                info!("Attached peripheral to computer");
                Ok(peripheral)
            }
            // Attached by someone else since the first read
            Ok(RefUpdate::Unchanged(_)) => Err(RelationshipError::AlreadyAttached),
            Err(StoreError::NotFound) => Err(RelationshipError::PeripheralNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Detach a peripheral from the computer it is currently attached to.
    ///
    /// A peripheral attached to a different computer is reported as [`RelationshipError::NotAttached`],
    /// which callers present exactly like a missing peripheral.
    #[instrument(
        skip(self, ctx),
        fields(
            correlation_id = %ctx.correlation_id,
            computer_id = %abbrev_uuid(&computer_id),
            peripheral_id = %abbrev_uuid(&peripheral_id)
        ),
        err
    )]
    pub async fn detach(&self, ctx: &RequestContext, computer_id: ComputerId, peripheral_id: PeripheralId) -> Result<PeripheralDBResponse> {
        let computer = self
            .computers()
            .get_by_id(computer_id)
            .await?
            .ok_or(RelationshipError::ComputerNotFound)?;
        self.check_relationship_owner(ctx, &computer, Operation::Detach)?;

        let peripheral = self
            .peripherals()
            .get_by_id(peripheral_id)
            .await?
            .ok_or(RelationshipError::PeripheralNotFound)?;
        if peripheral.computer != Some(computer_id) {
            return Err(RelationshipError::NotAttached);
        }

        match self.peripherals().set_computer_ref(peripheral_id, Some(computer_id), None).await {
            Ok(RefUpdate::Applied(peripheral)) => {
                counter!("hwctl_detach_total").increment(1);
                info!("Detached peripheral from computer");
                Ok(peripheral)
            }
            Ok(RefUpdate::Unchanged(_)) => Err(RelationshipError::NotAttached),
            Err(StoreError::NotFound) => Err(RelationshipError::PeripheralNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Idempotent cascade step: clear the peripheral's reference if it still names `computer_id`.
    ///
    /// Returns whether a write was made. A peripheral that has since been detached, re-attached
    /// elsewhere or deleted is left alone.
    #[instrument(skip(self), fields(computer_id = %abbrev_uuid(&computer_id), peripheral_id = %abbrev_uuid(&peripheral_id)), err)]
    pub async fn detach_if_attached_to(&self, computer_id: ComputerId, peripheral_id: PeripheralId) -> Result<bool> {
        match self.peripherals().set_computer_ref(peripheral_id, Some(computer_id), None).await {
            Ok(RefUpdate::Applied(_)) => Ok(true),
            Ok(RefUpdate::Unchanged(_)) | Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Detach every peripheral referencing the computer, then delete the computer.
    ///
    /// Returns the number of peripherals that were detached. Safe to call again after any
    /// failure: nothing is deleted until no peripheral references the computer.
    #[instrument(
        skip(self, ctx),
        fields(
            correlation_id = %ctx.correlation_id,
            computer_id = %abbrev_uuid(&computer_id),
            owner = %owner
        ),
        err
    )]
    pub async fn cascade_detach_and_delete_computer(&self, ctx: &RequestContext, computer_id: ComputerId, owner: &Subject) -> Result<usize> {
        let computer = self
            .computers()
            .get_by_id(computer_id)
            .await?
            .ok_or(RelationshipError::ComputerNotFound)?;
        if !computer.is_owned_by(owner) {
            return Err(RelationshipError::Forbidden {
                operation: Operation::Delete,
            });
        }

        let mut detached = 0;
        let mut passes = 0;
        loop {
            let referencing = self.peripherals().list_by_computer(computer_id).await?;
            if referencing.is_empty() {
                break;
            }
            if passes == self.config.max_cascade_passes {
                // Out of passes: only give up if a by-key read confirms a reference is still live
                if !self.any_still_attached(computer_id, &referencing).await? {
                    break;
                }
                counter!("hwctl_cascade_incomplete_total").increment(1);
                return Err(RelationshipError::CascadeUnsettled { passes });
            }
            passes += 1;

            let (written, failed) = self.detach_batch(computer_id, &referencing).await;
            detached += written;
            counter!("hwctl_cascade_detached_total").increment(written as u64);
            debug!(pass = passes, found = referencing.len(), written, failed, "Cascade detach pass finished");

            if failed > 0 {
                counter!("hwctl_cascade_incomplete_total").increment(1);
                return Err(RelationshipError::CascadeIncomplete { failed });
            }
            // Everything the query returned was already cleared by key; the query is stale
            if written == 0 {
                break;
            }
        }

        if !self.computers().delete(computer_id).await? {
            return Err(RelationshipError::ComputerNotFound);
        }
        info!(detached, passes, "Deleted computer after detaching its peripherals");
        Ok(detached)
    }

    /// Whether any of the enumerated peripherals, re-read by key, still references the computer.
    async fn any_still_attached(&self, computer_id: ComputerId, peripherals: &[PeripheralDBResponse]) -> Result<bool> {
        let repo = self.peripherals();
        for p in peripherals {
            if let Some(current) = repo.get_by_id(p.id).await? {
                if current.computer == Some(computer_id) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Clear a peripheral's reference if it names a computer that no longer exists.
    ///
    /// A peripheral update that read its reference before a cascade cleared it can write the old
    /// reference back after the computer is gone. This repairs that case and returns the
    /// peripheral as stored afterwards.
    #[instrument(skip(self, peripheral), fields(peripheral_id = %abbrev_uuid(&peripheral.id)), err)]
    pub async fn repair_dangling_reference(&self, peripheral: PeripheralDBResponse) -> Result<PeripheralDBResponse> {
        let Some(computer_id) = peripheral.computer else {
            return Ok(peripheral);
        };
        if self.computers().get_by_id(computer_id).await?.is_some() {
            return Ok(peripheral);
        }
        match self.peripherals().set_computer_ref(peripheral.id, Some(computer_id), None).await {
            Ok(RefUpdate::Applied(repaired)) => {
                counter!("hwctl_dangling_reference_repaired_total").increment(1);
                warn!(computer_id = %abbrev_uuid(&computer_id), "Cleared reference to a deleted computer");
                Ok(repaired)
            }
            Ok(RefUpdate::Unchanged(current)) => Ok(current),
            Err(StoreError::NotFound) => Err(RelationshipError::PeripheralNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Run one bounded-parallel batch of detaches. Returns `(written, failed)`.
    async fn detach_batch(&self, computer_id: ComputerId, peripherals: &[PeripheralDBResponse]) -> (usize, usize) {
        let width = self.config.cascade_concurrency.max(1);
        // Owned ids: streaming a borrowed slice iterator makes this future !Send
        let ids: Vec<PeripheralId> = peripherals.iter().map(|p| p.id).collect();
        let outcomes: Vec<_> = stream::iter(ids)
            .map(|peripheral_id| async move { (peripheral_id, self.detach_if_attached_to(computer_id, peripheral_id).await) })
            .buffer_unordered(width)
            .collect()
            .await;

        let mut written = 0;
        let mut failed = 0;
        for (peripheral_id, outcome) in outcomes {
            match outcome {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(peripheral_id = %abbrev_uuid(&peripheral_id), error = %e, "Failed to detach peripheral during cascade");
                    failed += 1;
                }
            }
        }
        (written, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        handlers::peripherals::PeripheralFilter,
        models::{
            computers::ComputerCreateDBRequest,
            peripherals::{COMPUTER, PeripheralCreateDBRequest},
        },
        store::{Entity, Kind, MemoryStore, Properties, PropertyFilter, Query, QueryPage},
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn config() -> RelationshipsConfig {
        RelationshipsConfig::default()
    }

    async fn create_computer(store: &dyn EntityStore, owner: &str) -> ComputerDBResponse {
        Computers::new(store)
            .create(&ComputerCreateDBRequest {
                manufacturer: "Dell".to_string(),
                model: "X1".to_string(),
                serial_number: "S1".to_string(),
                owner: Subject::new(owner),
            })
            .await
            .unwrap()
    }

    async fn create_peripheral(store: &dyn EntityStore, serial: &str) -> PeripheralDBResponse {
        Peripherals::new(store)
            .create(&PeripheralCreateDBRequest {
                manufacturer: "Logitech".to_string(),
                peripheral_type: "mouse".to_string(),
                serial_number: serial.to_string(),
            })
            .await
            .unwrap()
    }

    async fn reference_of(store: &dyn EntityStore, id: PeripheralId) -> Option<ComputerId> {
        Peripherals::new(store).get_by_id(id).await.unwrap().unwrap().computer
    }

    /// Every non-null reference names an existing computer.
    async fn assert_no_dangling_references(store: &dyn EntityStore) {
        let computers = Computers::new(store);
        let peripherals = Peripherals::new(store);
        let mut cursor = None;
        loop {
            let page = peripherals.list(&PeripheralFilter::new(cursor)).await.unwrap();
            for p in &page.items {
                if let Some(cid) = p.computer {
                    assert!(computers.get_by_id(cid).await.unwrap().is_some(), "dangling reference {cid}");
                }
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
    }

    #[tokio::test]
    async fn test_attach_sets_reference() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let computer = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;

        let attached = manager.attach(&RequestContext::detached(), computer.id, peripheral.id).await.unwrap();
        assert_eq!(attached.computer, Some(computer.id));
        assert_eq!(reference_of(&store, peripheral.id).await, Some(computer.id));
    }

    #[tokio::test]
    async fn test_attach_missing_entities() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let computer = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;

        let err = manager.attach(&ctx, computer.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RelationshipError::PeripheralNotFound));

        let err = manager.attach(&ctx, Uuid::new_v4(), peripheral.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::ComputerNotFound));
        assert_eq!(reference_of(&store, peripheral.id).await, None);
    }

    #[tokio::test]
    async fn test_attach_twice_conflicts_and_keeps_reference() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let first = create_computer(&store, "u1").await;
        let second = create_computer(&store, "u2").await;
        let peripheral = create_peripheral(&store, "M1").await;

        manager.attach(&ctx, first.id, peripheral.id).await.unwrap();

        let err = manager.attach(&ctx, first.id, peripheral.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::AlreadyAttached));
        let err = manager.attach(&ctx, second.id, peripheral.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::AlreadyAttached));

        assert_eq!(reference_of(&store, peripheral.id).await, Some(first.id));
        assert!(Peripherals::new(&store).list_by_computer(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detach_then_attach_elsewhere() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let first = create_computer(&store, "u1").await;
        let second = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;

        manager.attach(&ctx, first.id, peripheral.id).await.unwrap();
        let detached = manager.detach(&ctx, first.id, peripheral.id).await.unwrap();
        assert_eq!(detached.computer, None);
        manager.attach(&ctx, second.id, peripheral.id).await.unwrap();

        assert_eq!(reference_of(&store, peripheral.id).await, Some(second.id));
        let peripherals = Peripherals::new(&store);
        assert!(peripherals.list_by_computer(first.id).await.unwrap().is_empty());
        assert_eq!(peripherals.list_by_computer(second.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detach_from_wrong_computer_is_not_attached() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let first = create_computer(&store, "u1").await;
        let second = create_computer(&store, "u2").await;
        let peripheral = create_peripheral(&store, "M1").await;
        let loose = create_peripheral(&store, "M2").await;

        manager.attach(&ctx, first.id, peripheral.id).await.unwrap();

        let err = manager.detach(&ctx, second.id, peripheral.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::NotAttached));
        assert_eq!(reference_of(&store, peripheral.id).await, Some(first.id));

        let err = manager.detach(&ctx, first.id, loose.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::NotAttached));

        let err = manager.detach(&ctx, Uuid::new_v4(), peripheral.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::ComputerNotFound));

        let err = manager.detach(&ctx, first.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RelationshipError::PeripheralNotFound));
    }

    #[tokio::test]
    async fn test_require_owner_gates_attach_and_detach() {
        let store = MemoryStore::new();
        let config = RelationshipsConfig {
            require_owner: true,
            ..Default::default()
        };
        let manager = RelationshipManager::new(&store, &config);
        let computer = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;

        let anonymous = RequestContext::detached();
        let stranger = RequestContext::detached().with_subject(Subject::new("u2"));
        let owner = RequestContext::detached().with_subject(Subject::new("u1"));

        for ctx in [&anonymous, &stranger] {
            let err = manager.attach(ctx, computer.id, peripheral.id).await.unwrap_err();
            assert!(matches!(err, RelationshipError::Forbidden { operation: Operation::Attach }));
        }
        manager.attach(&owner, computer.id, peripheral.id).await.unwrap();

        let err = manager.detach(&stranger, computer.id, peripheral.id).await.unwrap_err();
        assert!(matches!(err, RelationshipError::Forbidden { operation: Operation::Detach }));
        manager.detach(&owner, computer.id, peripheral.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_detach_if_attached_to_is_idempotent() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let computer = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;
        manager.attach(&RequestContext::detached(), computer.id, peripheral.id).await.unwrap();

        assert!(manager.detach_if_attached_to(computer.id, peripheral.id).await.unwrap());
        assert!(!manager.detach_if_attached_to(computer.id, peripheral.id).await.unwrap());
        assert!(!manager.detach_if_attached_to(computer.id, Uuid::new_v4()).await.unwrap());
        assert_eq!(reference_of(&store, peripheral.id).await, None);
    }

    #[tokio::test]
    async fn test_cascade_detaches_exactly_the_attached_peripherals() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let doomed = create_computer(&store, "u1").await;
        let survivor = create_computer(&store, "u1").await;

        let mut attached = Vec::new();
        for i in 0..12 {
            let p = create_peripheral(&store, &format!("A{i}")).await;
            manager.attach(&ctx, doomed.id, p.id).await.unwrap();
            attached.push(p.id);
        }
        let elsewhere = create_peripheral(&store, "B1").await;
        manager.attach(&ctx, survivor.id, elsewhere.id).await.unwrap();
        let loose = create_peripheral(&store, "C1").await;

        let detached = manager
            .cascade_detach_and_delete_computer(&ctx, doomed.id, &Subject::new("u1"))
            .await
            .unwrap();
        assert_eq!(detached, attached.len());

        assert!(Computers::new(&store).get_by_id(doomed.id).await.unwrap().is_none());
        for id in &attached {
            assert_eq!(reference_of(&store, *id).await, None);
        }
        assert_eq!(reference_of(&store, elsewhere.id).await, Some(survivor.id));
        assert_eq!(reference_of(&store, loose.id).await, None);
        assert!(Peripherals::new(&store).list_by_computer(doomed.id).await.unwrap().is_empty());
        assert_no_dangling_references(&store).await;
    }

    #[tokio::test]
    async fn test_cascade_checks_owner_and_existence() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let computer = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;
        manager.attach(&ctx, computer.id, peripheral.id).await.unwrap();

        let err = manager
            .cascade_detach_and_delete_computer(&ctx, computer.id, &Subject::new("u2"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelationshipError::Forbidden { operation: Operation::Delete }));
        assert_eq!(reference_of(&store, peripheral.id).await, Some(computer.id));

        let err = manager
            .cascade_detach_and_delete_computer(&ctx, Uuid::new_v4(), &Subject::new("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelationshipError::ComputerNotFound));
    }

    /// Store wrapper that fails the first `failures` peripheral writes.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EntityStore for FlakyStore {
        async fn get(&self, kind: Kind, key: Uuid) -> crate::db::errors::Result<Option<Entity>> {
            self.inner.get(kind, key).await
        }

        async fn query(&self, kind: Kind, query: &Query) -> crate::db::errors::Result<QueryPage> {
            self.inner.query(kind, query).await
        }

        async fn count(&self, kind: Kind, filter: Option<&PropertyFilter>) -> crate::db::errors::Result<u64> {
            self.inner.count(kind, filter).await
        }

        async fn insert(&self, kind: Kind, properties: Properties) -> crate::db::errors::Result<Entity> {
            self.inner.insert(kind, properties).await
        }

        async fn put(&self, kind: Kind, entity: &Entity) -> crate::db::errors::Result<()> {
            if kind == Kind::Peripheral
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StoreError::Other(anyhow::anyhow!("injected write failure")));
            }
            self.inner.put(kind, entity).await
        }

        async fn delete(&self, kind: Kind, key: Uuid) -> crate::db::errors::Result<bool> {
            self.inner.delete(kind, key).await
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_cascade_keeps_computer_and_retry_converges() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(0),
        };
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let owner = Subject::new("u1");
        let computer = create_computer(&store, "u1").await;
        let mut attached = Vec::new();
        for i in 0..6 {
            let p = create_peripheral(&store, &format!("A{i}")).await;
            manager.attach(&ctx, computer.id, p.id).await.unwrap();
            attached.push(p.id);
        }

        store.failures.store(2, Ordering::SeqCst);
        let err = manager
            .cascade_detach_and_delete_computer(&ctx, computer.id, &owner)
            .await
            .unwrap_err();
        assert!(matches!(err, RelationshipError::CascadeIncomplete { failed: 2 }));

        // Partially detached, nothing dangling, computer still present
        assert!(Computers::new(&store).get_by_id(computer.id).await.unwrap().is_some());
        assert_eq!(Peripherals::new(&store).list_by_computer(computer.id).await.unwrap().len(), 2);
        assert_no_dangling_references(&store).await;

        let detached = manager
            .cascade_detach_and_delete_computer(&ctx, computer.id, &owner)
            .await
            .unwrap();
        assert_eq!(detached, 2);
        assert!(Computers::new(&store).get_by_id(computer.id).await.unwrap().is_none());
        for id in attached {
            assert_eq!(reference_of(&store, id).await, None);
        }
    }

    /// Store wrapper whose property queries keep returning entities after they stop matching.
    struct StaleQueryStore {
        inner: MemoryStore,
        stale: tokio::sync::Mutex<Option<QueryPage>>,
    }

    #[async_trait::async_trait]
    impl EntityStore for StaleQueryStore {
        async fn get(&self, kind: Kind, key: Uuid) -> crate::db::errors::Result<Option<Entity>> {
            self.inner.get(kind, key).await
        }

        async fn query(&self, kind: Kind, query: &Query) -> crate::db::errors::Result<QueryPage> {
            if query.filter.is_some() {
                let mut stale = self.stale.lock().await;
                if let Some(page) = stale.as_ref() {
                    return Ok(page.clone());
                }
                let page = self.inner.query(kind, query).await?;
                *stale = Some(page.clone());
                return Ok(page);
            }
            self.inner.query(kind, query).await
        }

        async fn count(&self, kind: Kind, filter: Option<&PropertyFilter>) -> crate::db::errors::Result<u64> {
            self.inner.count(kind, filter).await
        }

        async fn insert(&self, kind: Kind, properties: Properties) -> crate::db::errors::Result<Entity> {
            self.inner.insert(kind, properties).await
        }

        async fn put(&self, kind: Kind, entity: &Entity) -> crate::db::errors::Result<()> {
            self.inner.put(kind, entity).await
        }

        async fn delete(&self, kind: Kind, key: Uuid) -> crate::db::errors::Result<bool> {
            self.inner.delete(kind, key).await
        }
    }

    #[tokio::test]
    async fn test_cascade_settles_on_stale_query() {
        let inner = MemoryStore::new();
        let computer = create_computer(&inner, "u1").await;
        let peripheral = create_peripheral(&inner, "M1").await;
        Peripherals::new(&inner)
            .set_computer_ref(peripheral.id, None, Some(computer.id))
            .await
            .unwrap();

        let store = StaleQueryStore {
            inner,
            stale: tokio::sync::Mutex::new(None),
        };
        let config = config();
        let manager = RelationshipManager::new(&store, &config);

        // The second enumeration still reports the peripheral, but the by-key re-read finds
        // nothing to clear, so the cascade settles and deletes.
        let detached = manager
            .cascade_detach_and_delete_computer(&RequestContext::detached(), computer.id, &Subject::new("u1"))
            .await
            .unwrap();
        assert_eq!(detached, 1);
        assert!(Computers::new(&store).get_by_id(computer.id).await.unwrap().is_none());
        assert_eq!(reference_of(&store, peripheral.id).await, None);
    }

    #[tokio::test]
    async fn test_cascade_gives_up_after_max_passes() {
        let store = MemoryStore::new();
        let config = RelationshipsConfig {
            max_cascade_passes: 1,
            ..Default::default()
        };
        let manager = RelationshipManager::new(&store, &config);
        let computer = create_computer(&store, "u1").await;
        let peripheral = create_peripheral(&store, "M1").await;
        Peripherals::new(&store)
            .set_computer_ref(peripheral.id, None, Some(computer.id))
            .await
            .unwrap();

        // A single pass clears the peripheral and the confirming enumeration finds nothing
        manager
            .cascade_detach_and_delete_computer(&RequestContext::detached(), computer.id, &Subject::new("u1"))
            .await
            .unwrap();

        let config = RelationshipsConfig {
            max_cascade_passes: 1,
            ..Default::default()
        };
        let racing = RacingStore {
            inner: MemoryStore::new(),
            computer: tokio::sync::Mutex::new(None),
        };
        let manager = RelationshipManager::new(&racing, &config);
        let computer = create_computer(&racing, "u1").await;
        *racing.computer.lock().await = Some(computer.id);
        let peripheral = create_peripheral(&racing, "M1").await;
        Peripherals::new(&racing)
            .set_computer_ref(peripheral.id, None, Some(computer.id))
            .await
            .unwrap();

        let err = manager
            .cascade_detach_and_delete_computer(&RequestContext::detached(), computer.id, &Subject::new("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RelationshipError::CascadeUnsettled { passes: 1 }));
        assert!(Computers::new(&racing).get_by_id(computer.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_single_pass_cascade_settles_on_stale_query() {
        let inner = MemoryStore::new();
        let computer = create_computer(&inner, "u1").await;
        let peripheral = create_peripheral(&inner, "M1").await;
        Peripherals::new(&inner)
            .set_computer_ref(peripheral.id, None, Some(computer.id))
            .await
            .unwrap();

        let store = StaleQueryStore {
            inner,
            stale: tokio::sync::Mutex::new(None),
        };
        let config = RelationshipsConfig {
            max_cascade_passes: 1,
            ..Default::default()
        };
        let manager = RelationshipManager::new(&store, &config);

        // The pass budget is spent, but the enumeration that remains is stale by key
        let detached = manager
            .cascade_detach_and_delete_computer(&RequestContext::detached(), computer.id, &Subject::new("u1"))
            .await
            .unwrap();
        assert_eq!(detached, 1);
        assert!(Computers::new(&store).get_by_id(computer.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repair_dangling_reference() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let kept = create_computer(&store, "u1").await;
        let removed = create_computer(&store, "u1").await;
        let healthy = create_peripheral(&store, "M1").await;
        let dangling = create_peripheral(&store, "M2").await;
        let loose = create_peripheral(&store, "M3").await;
        let healthy = manager.attach(&ctx, kept.id, healthy.id).await.unwrap();
        let dangling = manager.attach(&ctx, removed.id, dangling.id).await.unwrap();
        assert!(Computers::new(&store).delete(removed.id).await.unwrap());

        let repaired = manager.repair_dangling_reference(dangling.clone()).await.unwrap();
        assert_eq!(repaired.computer, None);
        assert_eq!(reference_of(&store, dangling.id).await, None);

        assert_eq!(manager.repair_dangling_reference(healthy.clone()).await.unwrap(), healthy);
        assert_eq!(manager.repair_dangling_reference(loose.clone()).await.unwrap(), loose);
        assert_no_dangling_references(&store).await;
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_cascade_future_is_send() {
        let store = MemoryStore::new();
        let config = config();
        let manager = RelationshipManager::new(&store, &config);
        let ctx = RequestContext::detached();
        let owner = Subject::new("u1");
        let computer = create_computer(&store, "u1").await;

        // Axum handlers must return Send futures; this is checked when the test compiles
        let cascade = manager.cascade_detach_and_delete_computer(&ctx, computer.id, &owner);
        assert_send(&cascade);
        assert_eq!(cascade.await.unwrap(), 0);
    }

    /// Store wrapper that attaches a fresh peripheral to `computer` every time one is detached,
    /// simulating a concurrent client that keeps attaching.
    struct RacingStore {
        inner: MemoryStore,
        computer: tokio::sync::Mutex<Option<ComputerId>>,
    }

    #[async_trait::async_trait]
    impl EntityStore for RacingStore {
        async fn get(&self, kind: Kind, key: Uuid) -> crate::db::errors::Result<Option<Entity>> {
            self.inner.get(kind, key).await
        }

        async fn query(&self, kind: Kind, query: &Query) -> crate::db::errors::Result<QueryPage> {
            self.inner.query(kind, query).await
        }

        async fn count(&self, kind: Kind, filter: Option<&PropertyFilter>) -> crate::db::errors::Result<u64> {
            self.inner.count(kind, filter).await
        }

        async fn insert(&self, kind: Kind, properties: Properties) -> crate::db::errors::Result<Entity> {
            self.inner.insert(kind, properties).await
        }

        async fn put(&self, kind: Kind, entity: &Entity) -> crate::db::errors::Result<()> {
            self.inner.put(kind, entity).await?;
            let detaching = kind == Kind::Peripheral && entity.properties.get(COMPUTER).is_some_and(|v| v.is_null());
            if detaching {
                if let Some(computer) = *self.computer.lock().await {
                    let mut properties = entity.properties.clone();
                    properties.insert(COMPUTER.to_string(), serde_json::Value::from(computer.to_string()));
                    self.inner.insert(Kind::Peripheral, properties).await?;
                }
            }
            Ok(())
        }

        async fn delete(&self, kind: Kind, key: Uuid) -> crate::db::errors::Result<bool> {
            self.inner.delete(kind, key).await
        }
    }
}
