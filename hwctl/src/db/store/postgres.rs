//! PostgreSQL-backed entity store.
//!
//! All kinds share the `entities` table (see `migrations/`). Property maps are stored as JSONB
//! and equality filters use containment (`properties @> {"name": value}`) so they can be served
//! by the GIN index. Pagination is keyset-based on `id`.

use super::{Entity, EntityStore, Kind, Properties, PropertyFilter, Query, QueryPage, decode_key_cursor, encode_key_cursor};
use crate::config::PoolSettings;
use crate::db::errors::Result;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct PostgresStore {
    pool: PgPool,
}

fn filter_document(filter: Option<&PropertyFilter>) -> Option<Json<Value>> {
    filter.map(|f| {
        let mut doc = Properties::new();
        doc.insert(f.name.clone(), f.value.clone());
        Json(Value::Object(doc))
    })
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool with the given settings.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout((settings.idle_timeout_secs > 0).then(|| Duration::from_secs(settings.idle_timeout_secs)))
            .max_lifetime((settings.max_lifetime_secs > 0).then(|| Duration::from_secs(settings.max_lifetime_secs)))
            .connect(url)
            .await?;
        info!("Connected to PostgreSQL entity store");
        Ok(Self::new(pool))
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        crate::migrator().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn get(&self, kind: Kind, key: Uuid) -> Result<Option<Entity>> {
        let row = sqlx::query("SELECT id, properties FROM entities WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let Json(properties): Json<Properties> = row.try_get("properties")?;
                Ok(Some(Entity::new(row.try_get("id")?, properties)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, query), fields(limit = ?query.limit, has_cursor = query.cursor.is_some()), err)]
    async fn query(&self, kind: Kind, query: &Query) -> Result<QueryPage> {
        let after = query.cursor.as_ref().map(decode_key_cursor).transpose()?;
        // Fetch one extra row to learn whether another page exists
        let fetch_limit = query.limit.map(|limit| limit as i64 + 1);

        let rows = sqlx::query(
            r#"
            SELECT id, properties
            FROM entities
            WHERE kind = $1
              AND ($2::jsonb IS NULL OR properties @> $2::jsonb)
              AND ($3::uuid IS NULL OR id > $3)
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(kind.as_str())
        .bind(filter_document(query.filter.as_ref()))
        .bind(after)
        .bind(fetch_limit)
        .fetch_all(&self.pool)
        .await?;

        let mut entities = rows
            .into_iter()
            .map(|row| {
                let Json(properties): Json<Properties> = row.try_get("properties")?;
                Ok(Entity::new(row.try_get("id")?, properties))
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()?;

        let has_more = matches!(query.limit, Some(limit) if entities.len() > limit);
        if let Some(limit) = query.limit {
            entities.truncate(limit);
        }
        let next = match entities.last() {
            Some(last) if has_more => Some(encode_key_cursor(&last.key)),
            _ => None,
        };

        Ok(QueryPage { entities, next })
    }

    #[instrument(skip(self), err)]
    async fn count(&self, kind: Kind, filter: Option<&PropertyFilter>) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM entities WHERE kind = $1 AND ($2::jsonb IS NULL OR properties @> $2::jsonb)",
        )
        .bind(kind.as_str())
        .bind(filter_document(filter))
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self, properties), err)]
    async fn insert(&self, kind: Kind, properties: Properties) -> Result<Entity> {
        let key = Uuid::new_v4();
        sqlx::query("INSERT INTO entities (kind, id, properties) VALUES ($1, $2, $3)")
            .bind(kind.as_str())
            .bind(key)
            .bind(Json(&properties))
            .execute(&self.pool)
            .await?;
        Ok(Entity::new(key, properties))
    }

    #[instrument(skip(self, entity), fields(key = %entity.key), err)]
    async fn put(&self, kind: Kind, entity: &Entity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entities (kind, id, properties) VALUES ($1, $2, $3)
            ON CONFLICT (kind, id) DO UPDATE SET properties = EXCLUDED.properties, updated_at = NOW()
            "#,
        )
        .bind(kind.as_str())
        .bind(entity.key)
        .bind(Json(&entity.properties))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, kind: Kind, key: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
