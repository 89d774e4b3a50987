//! API request/response models for peripherals.
//!
//! The `computer` attribute is read-only here; it changes only through the attach and detach
//! endpoints.

use super::Link;
use super::validation::{SERVER_ASSIGNED, reject_forbidden, require_all, require_any};
use crate::api::extractors::RequestOrigin;
use crate::db::models::peripherals::{
    COMPUTER, MANUFACTURER, PeripheralCreateDBRequest, PeripheralDBResponse, PeripheralUpdateDBRequest, SERIAL_NUMBER,
    TYPE,
};
use crate::errors::Error;
use crate::types::PeripheralId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

const FIELDS: [&str; 3] = [MANUFACTURER, TYPE, SERIAL_NUMBER];

fn forbidden() -> Vec<&'static str> {
    SERVER_ASSIGNED.iter().copied().chain([COMPUTER]).collect()
}

/// Request body for creating (`POST`) or replacing (`PUT`) a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PeripheralCreate {
    #[schema(example = "Logitech")]
    pub manufacturer: String,
    #[serde(rename = "type")]
    #[schema(example = "mouse")]
    pub peripheral_type: String,
    #[schema(example = "M-1001")]
    pub serial_number: String,
}

impl PeripheralCreate {
    pub fn from_create_body(body: &Map<String, Value>) -> Result<Self, Error> {
        reject_forbidden(body, &forbidden())?;
        Self::from_required(body)
    }

    pub fn from_replace_body(body: &Map<String, Value>) -> Result<Self, Error> {
        let replacement = Self::from_required(body)?;
        reject_forbidden(body, &forbidden())?;
        Ok(replacement)
    }

    fn from_required(body: &Map<String, Value>) -> Result<Self, Error> {
        let mut values = require_all(body, &FIELDS)?.into_iter();
        match (values.next(), values.next(), values.next()) {
            (Some(manufacturer), Some(peripheral_type), Some(serial_number)) => Ok(Self {
                manufacturer,
                peripheral_type,
                serial_number,
            }),
            _ => Err(Error::Internal {
                operation: "validate peripheral attributes".to_string(),
            }),
        }
    }

    pub fn into_db_request(self) -> PeripheralCreateDBRequest {
        PeripheralCreateDBRequest {
            manufacturer: self.manufacturer,
            peripheral_type: self.peripheral_type,
            serial_number: self.serial_number,
        }
    }

    pub fn into_replace_request(self) -> PeripheralUpdateDBRequest {
        PeripheralUpdateDBRequest {
            manufacturer: Some(self.manufacturer),
            peripheral_type: Some(self.peripheral_type),
            serial_number: Some(self.serial_number),
        }
    }
}

/// Request body for partially updating a peripheral (`PATCH`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PeripheralUpdate {
    pub manufacturer: Option<String>,
    #[serde(rename = "type")]
    pub peripheral_type: Option<String>,
    pub serial_number: Option<String>,
}

impl PeripheralUpdate {
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, Error> {
        reject_forbidden(body, &forbidden())?;
        let mut values = require_any(body, &FIELDS)?.into_iter();
        Ok(Self {
            manufacturer: values.next().flatten(),
            peripheral_type: values.next().flatten(),
            serial_number: values.next().flatten(),
        })
    }

    pub fn into_db_request(self) -> PeripheralUpdateDBRequest {
        PeripheralUpdateDBRequest {
            manufacturer: self.manufacturer,
            peripheral_type: self.peripheral_type,
            serial_number: self.serial_number,
        }
    }
}

/// A peripheral as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PeripheralResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PeripheralId,
    pub manufacturer: String,
    #[serde(rename = "type")]
    pub peripheral_type: String,
    pub serial_number: String,
    /// Computer this peripheral is attached to; null when unattached
    pub computer: Option<Link>,
    /// Absolute URL of this peripheral
    #[serde(rename = "self")]
    pub self_link: String,
}

impl PeripheralResponse {
    pub fn new(peripheral: PeripheralDBResponse, origin: &RequestOrigin) -> Self {
        Self {
            self_link: origin.peripheral_url(&peripheral.id),
            computer: peripheral.computer.map(|id| Link {
                id,
                self_link: origin.computer_url(&id),
            }),
            id: peripheral.id,
            manufacturer: peripheral.manufacturer,
            peripheral_type: peripheral.peripheral_type,
            serial_number: peripheral.serial_number,
        }
    }
}
