//! In-process entity store.

use super::{Entity, EntityStore, Kind, Properties, PropertyFilter, Query, QueryPage, decode_key_cursor, encode_key_cursor};
use crate::db::errors::Result;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

/// Ordered in-memory maps, one per kind.
///
/// Queries observe every completed write, which is stronger than the store contract requires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    kinds: RwLock<HashMap<Kind, BTreeMap<Uuid, Properties>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    #[instrument(skip(self), err)]
    async fn get(&self, kind: Kind, key: Uuid) -> Result<Option<Entity>> {
        let kinds = self.kinds.read().await;
        Ok(kinds
            .get(&kind)
            .and_then(|entities| entities.get(&key))
            .map(|properties| Entity::new(key, properties.clone())))
    }

    #[instrument(skip(self, query), fields(limit = ?query.limit, has_cursor = query.cursor.is_some()), err)]
    async fn query(&self, kind: Kind, query: &Query) -> Result<QueryPage> {
        let lower = match &query.cursor {
            Some(cursor) => Bound::Excluded(decode_key_cursor(cursor)?),
            None => Bound::Unbounded,
        };

        let kinds = self.kinds.read().await;
        let Some(entities) = kinds.get(&kind) else {
            return Ok(QueryPage::default());
        };

        let mut matching = entities
            .range((lower, Bound::Unbounded))
            .filter(|(_, properties)| query.filter.as_ref().is_none_or(|f| f.matches(properties)))
            .map(|(key, properties)| Entity::new(*key, properties.clone()));

        let page: Vec<Entity> = match query.limit {
            Some(limit) => matching.by_ref().take(limit).collect(),
            None => matching.by_ref().collect(),
        };
        let has_more = matching.next().is_some();

        let next = match page.last() {
            Some(last) if has_more => Some(encode_key_cursor(&last.key)),
            _ => None,
        };

        Ok(QueryPage { entities: page, next })
    }

    #[instrument(skip(self), err)]
    async fn count(&self, kind: Kind, filter: Option<&PropertyFilter>) -> Result<u64> {
        let kinds = self.kinds.read().await;
        let count = kinds
            .get(&kind)
            .map(|entities| entities.values().filter(|p| filter.is_none_or(|f| f.matches(p))).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    #[instrument(skip(self, properties), err)]
    async fn insert(&self, kind: Kind, properties: Properties) -> Result<Entity> {
        let key = Uuid::new_v4();
        let mut kinds = self.kinds.write().await;
        kinds.entry(kind).or_default().insert(key, properties.clone());
        Ok(Entity::new(key, properties))
    }

    #[instrument(skip(self, entity), fields(key = %entity.key), err)]
    async fn put(&self, kind: Kind, entity: &Entity) -> Result<()> {
        let mut kinds = self.kinds.write().await;
        kinds.entry(kind).or_default().insert(entity.key, entity.properties.clone());
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, kind: Kind, key: Uuid) -> Result<bool> {
        let mut kinds = self.kinds.write().await;
        Ok(kinds.get_mut(&kind).and_then(|entities| entities.remove(&key)).is_some())
    }
}
