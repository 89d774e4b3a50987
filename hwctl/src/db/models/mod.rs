//! Typed records for entities held in the schemaless store.
//!
//! The store only knows property maps. Each kind gets a `*DBResponse` record with fixed
//! required/optional fields plus the create/update request types its repository accepts.
//! Conversion happens once, here, so no code above the repositories ever inspects raw
//! properties.

pub mod computers;
pub mod peripherals;

use crate::db::errors::{Result, StoreError};
use crate::db::store::{Entity, Kind};
use serde_json::Value;
use uuid::Uuid;

fn corrupt(kind: Kind, entity: &Entity, reason: String) -> StoreError {
    StoreError::Corrupt {
        kind: kind.to_string(),
        key: entity.key.to_string(),
        reason,
    }
}

/// Read a required string property.
pub(crate) fn required_string(kind: Kind, entity: &Entity, name: &str) -> Result<String> {
    match entity.properties.get(name) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(corrupt(kind, entity, format!("property '{name}' is not a string: {other}"))),
        None => Err(corrupt(kind, entity, format!("property '{name}' is missing"))),
    }
}

/// Read a nullable UUID reference. Absent and `null` both mean "no reference".
pub(crate) fn optional_uuid(kind: Kind, entity: &Entity, name: &str) -> Result<Option<Uuid>> {
    match entity.properties.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Uuid::parse_str(value)
            .map(Some)
            .map_err(|e| corrupt(kind, entity, format!("property '{name}' is not a valid id: {e}"))),
        Some(other) => Err(corrupt(kind, entity, format!("property '{name}' is not a string: {other}"))),
    }
}
