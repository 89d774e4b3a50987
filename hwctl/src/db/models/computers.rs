use super::required_string;
use crate::db::errors::Result;
use crate::db::store::{Entity, Kind, Properties};
use crate::types::{ComputerId, Subject};
use serde_json::Value;

pub const MANUFACTURER: &str = "manufacturer";
pub const MODEL: &str = "model";
pub const SERIAL_NUMBER: &str = "serial_number";
pub const OWNER: &str = "owner";

/// Database request for creating a new computer
#[derive(Debug, Clone)]
pub struct ComputerCreateDBRequest {
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub owner: Subject,
}

/// Database request for updating a computer.
///
/// `None` keeps the stored value, so a full replacement simply sets every field. The owner is
/// not a field that can change: it scopes which computer may be updated.
#[derive(Debug, Clone)]
pub struct ComputerUpdateDBRequest {
    pub owner: Subject,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

impl ComputerUpdateDBRequest {
    pub fn new(owner: Subject) -> Self {
        Self {
            owner,
            manufacturer: None,
            model: None,
            serial_number: None,
        }
    }

    /// Full replacement: every descriptive field is overwritten.
    pub fn replace(owner: Subject, manufacturer: String, model: String, serial_number: String) -> Self {
        Self {
            owner,
            manufacturer: Some(manufacturer),
            model: Some(model),
            serial_number: Some(serial_number),
        }
    }
}

/// Database response for a computer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputerDBResponse {
    pub id: ComputerId,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub owner: Subject,
}

impl ComputerDBResponse {
    pub(crate) fn from_entity(entity: &Entity) -> Result<Self> {
        Ok(Self {
            id: entity.key,
            manufacturer: required_string(Kind::Computer, entity, MANUFACTURER)?,
            model: required_string(Kind::Computer, entity, MODEL)?,
            serial_number: required_string(Kind::Computer, entity, SERIAL_NUMBER)?,
            owner: Subject::new(required_string(Kind::Computer, entity, OWNER)?),
        })
    }

    pub(crate) fn to_entity(&self) -> Entity {
        Entity::new(self.id, computer_properties(&self.manufacturer, &self.model, &self.serial_number, &self.owner))
    }

    /// Apply an update request on top of this record.
    pub(crate) fn apply(mut self, request: &ComputerUpdateDBRequest) -> Self {
        if let Some(manufacturer) = &request.manufacturer {
            self.manufacturer = manufacturer.clone();
        }
        if let Some(model) = &request.model {
            self.model = model.clone();
        }
        if let Some(serial_number) = &request.serial_number {
            self.serial_number = serial_number.clone();
        }
        self
    }

    pub fn is_owned_by(&self, subject: &Subject) -> bool {
        &self.owner == subject
    }
}

impl ComputerCreateDBRequest {
    pub(crate) fn to_properties(&self) -> Properties {
        computer_properties(&self.manufacturer, &self.model, &self.serial_number, &self.owner)
    }
}

fn computer_properties(manufacturer: &str, model: &str, serial_number: &str, owner: &Subject) -> Properties {
    let mut properties = Properties::new();
    properties.insert(MANUFACTURER.to_string(), Value::from(manufacturer));
    properties.insert(MODEL.to_string(), Value::from(model));
    properties.insert(SERIAL_NUMBER.to_string(), Value::from(serial_number));
    properties.insert(OWNER.to_string(), Value::from(owner.as_str()));
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::StoreError;
    use serde_json::json;
    use uuid::Uuid;

    fn sample() -> ComputerDBResponse {
        ComputerDBResponse {
            id: Uuid::new_v4(),
            manufacturer: "Dell".to_string(),
            model: "X1".to_string(),
            serial_number: "S1".to_string(),
            owner: Subject::new("u1"),
        }
    }

    #[test]
    fn test_entity_conversion() {
        let computer = sample();
        let entity = computer.to_entity();
        assert_eq!(entity.properties["owner"], json!("u1"));
        assert_eq!(ComputerDBResponse::from_entity(&entity).unwrap(), computer);
    }

    #[test]
    fn test_missing_property_is_corrupt() {
        let mut entity = sample().to_entity();
        entity.properties.remove(MODEL);
        let err = ComputerDBResponse::from_entity(&entity).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_partial_apply_keeps_other_fields() {
        let computer = sample();
        let mut request = ComputerUpdateDBRequest::new(Subject::new("u1"));
        request.model = Some("X2".to_string());
        let updated = computer.clone().apply(&request);
        assert_eq!(updated.model, "X2");
        assert_eq!(updated.manufacturer, computer.manufacturer);
        assert_eq!(updated.serial_number, computer.serial_number);
    }
}
