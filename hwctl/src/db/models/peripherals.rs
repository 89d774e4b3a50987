use super::{optional_uuid, required_string};
use crate::db::errors::Result;
use crate::db::store::{Entity, Kind, Properties};
use crate::types::{ComputerId, PeripheralId};
use serde_json::Value;

pub const MANUFACTURER: &str = "manufacturer";
pub const TYPE: &str = "type";
pub const SERIAL_NUMBER: &str = "serial_number";
pub const COMPUTER: &str = "computer";

/// Database request for creating a new (always unattached) peripheral
#[derive(Debug, Clone)]
pub struct PeripheralCreateDBRequest {
    pub manufacturer: String,
    pub peripheral_type: String,
    pub serial_number: String,
}

/// Database request for updating the descriptive fields of a peripheral.
///
/// There is deliberately no `computer` field: the attachment is changed only through the
/// relationship manager.
#[derive(Debug, Clone, Default)]
pub struct PeripheralUpdateDBRequest {
    pub manufacturer: Option<String>,
    pub peripheral_type: Option<String>,
    pub serial_number: Option<String>,
}

/// Database response for a peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralDBResponse {
    pub id: PeripheralId,
    pub manufacturer: String,
    pub peripheral_type: String,
    pub serial_number: String,
    /// Computer this peripheral is attached to, `None` when unattached
    pub computer: Option<ComputerId>,
}

impl PeripheralDBResponse {
    pub(crate) fn from_entity(entity: &Entity) -> Result<Self> {
        Ok(Self {
            id: entity.key,
            manufacturer: required_string(Kind::Peripheral, entity, MANUFACTURER)?,
            peripheral_type: required_string(Kind::Peripheral, entity, TYPE)?,
            serial_number: required_string(Kind::Peripheral, entity, SERIAL_NUMBER)?,
            computer: optional_uuid(Kind::Peripheral, entity, COMPUTER)?,
        })
    }

    pub(crate) fn to_entity(&self) -> Entity {
        Entity::new(
            self.id,
            peripheral_properties(&self.manufacturer, &self.peripheral_type, &self.serial_number, self.computer),
        )
    }

    pub(crate) fn apply(mut self, request: &PeripheralUpdateDBRequest) -> Self {
        if let Some(manufacturer) = &request.manufacturer {
            self.manufacturer = manufacturer.clone();
        }
        if let Some(peripheral_type) = &request.peripheral_type {
            self.peripheral_type = peripheral_type.clone();
        }
        if let Some(serial_number) = &request.serial_number {
            self.serial_number = serial_number.clone();
        }
        self
    }

    pub fn is_attached(&self) -> bool {
        self.computer.is_some()
    }
}

impl PeripheralCreateDBRequest {
    pub(crate) fn to_properties(&self) -> Properties {
        peripheral_properties(&self.manufacturer, &self.peripheral_type, &self.serial_number, None)
    }
}

/// Stored value of the back-reference; `null` marks an unattached peripheral.
pub(crate) fn computer_ref_value(computer: Option<ComputerId>) -> Value {
    computer.map(|id| Value::from(id.to_string())).unwrap_or(Value::Null)
}

fn peripheral_properties(manufacturer: &str, peripheral_type: &str, serial_number: &str, computer: Option<ComputerId>) -> Properties {
    let mut properties = Properties::new();
    properties.insert(MANUFACTURER.to_string(), Value::from(manufacturer));
    properties.insert(TYPE.to_string(), Value::from(peripheral_type));
    properties.insert(SERIAL_NUMBER.to_string(), Value::from(serial_number));
    properties.insert(COMPUTER.to_string(), computer_ref_value(computer));
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::errors::StoreError;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_new_peripheral_is_unattached() {
        let request = PeripheralCreateDBRequest {
            manufacturer: "Logitech".to_string(),
            peripheral_type: "mouse".to_string(),
            serial_number: "M1".to_string(),
        };
        let properties = request.to_properties();
        assert_eq!(properties[COMPUTER], Value::Null);
        assert_eq!(properties[TYPE], json!("mouse"));
    }

    #[test]
    fn test_entity_conversion_with_reference() {
        let peripheral = PeripheralDBResponse {
            id: Uuid::new_v4(),
            manufacturer: "Logitech".to_string(),
            peripheral_type: "keyboard".to_string(),
            serial_number: "K1".to_string(),
            computer: Some(Uuid::new_v4()),
        };
        let entity = peripheral.to_entity();
        assert_eq!(PeripheralDBResponse::from_entity(&entity).unwrap(), peripheral);
    }

    #[test]
    fn test_bad_reference_is_corrupt() {
        let mut entity = Entity::new(Uuid::new_v4(), peripheral_properties("a", "b", "c", None));
        entity.properties.insert(COMPUTER.to_string(), json!("not-a-uuid"));
        assert!(matches!(
            PeripheralDBResponse::from_entity(&entity),
            Err(StoreError::Corrupt { .. })
        ));

        entity.properties.remove(COMPUTER);
        assert_eq!(PeripheralDBResponse::from_entity(&entity).unwrap().computer, None);
    }
}
