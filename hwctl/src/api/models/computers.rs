//! API request/response models for computers.

use super::Link;
use super::validation::{SERVER_ASSIGNED, reject_forbidden, require_all, require_any};
use crate::api::extractors::RequestOrigin;
use crate::db::models::computers::{
    ComputerCreateDBRequest, ComputerDBResponse, ComputerUpdateDBRequest, MANUFACTURER, MODEL, SERIAL_NUMBER,
};
use crate::db::models::peripherals::PeripheralDBResponse;
use crate::errors::Error;
use crate::types::{ComputerId, Subject};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

const FIELDS: [&str; 3] = [MANUFACTURER, MODEL, SERIAL_NUMBER];

/// Request body for creating a computer (`POST`) or replacing one (`PUT`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ComputerCreate {
    #[schema(example = "Dell")]
    pub manufacturer: String,
    #[schema(example = "XPS 13")]
    pub model: String,
    #[schema(example = "SN-0042")]
    pub serial_number: String,
}

impl ComputerCreate {
    /// Validate a `POST` body: server-assigned attributes first, then required ones.
    pub fn from_create_body(body: &Map<String, Value>) -> Result<Self, Error> {
        reject_forbidden(body, SERVER_ASSIGNED)?;
        Self::from_required(body)
    }

    /// Validate a `PUT` body: required attributes first, then server-assigned ones.
    pub fn from_replace_body(body: &Map<String, Value>) -> Result<Self, Error> {
        let replacement = Self::from_required(body)?;
        reject_forbidden(body, SERVER_ASSIGNED)?;
        Ok(replacement)
    }

    fn from_required(body: &Map<String, Value>) -> Result<Self, Error> {
        let [manufacturer, model, serial_number]: [String; 3] = require_all(body, &FIELDS)?
            .try_into()
            .map_err(|_| Error::Internal {
                operation: "validate computer attributes".to_string(),
            })?;
        Ok(Self {
            manufacturer,
            model,
            serial_number,
        })
    }

    pub fn into_db_request(self, owner: Subject) -> ComputerCreateDBRequest {
        ComputerCreateDBRequest {
            manufacturer: self.manufacturer,
            model: self.model,
            serial_number: self.serial_number,
            owner,
        }
    }

    pub fn into_replace_request(self, owner: Subject) -> ComputerUpdateDBRequest {
        ComputerUpdateDBRequest::replace(owner, self.manufacturer, self.model, self.serial_number)
    }
}

/// Request body for partially updating a computer (`PATCH`). At least one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ComputerUpdate {
    #[schema(example = "Lenovo")]
    pub manufacturer: Option<String>,
    #[schema(example = "ThinkPad X1")]
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

impl ComputerUpdate {
    pub fn from_body(body: &Map<String, Value>) -> Result<Self, Error> {
        reject_forbidden(body, SERVER_ASSIGNED)?;
        let mut values = require_any(body, &FIELDS)?.into_iter();
        Ok(Self {
            manufacturer: values.next().flatten(),
            model: values.next().flatten(),
            serial_number: values.next().flatten(),
        })
    }

    pub fn into_db_request(self, owner: Subject) -> ComputerUpdateDBRequest {
        ComputerUpdateDBRequest {
            owner,
            manufacturer: self.manufacturer,
            model: self.model,
            serial_number: self.serial_number,
        }
    }
}

/// A computer as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ComputerResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ComputerId,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    /// Subject that created the computer
    #[schema(value_type = String)]
    pub owner: Subject,
    /// Absolute URL of this computer
    #[serde(rename = "self")]
    pub self_link: String,
    /// Peripherals currently attached to this computer
    pub peripherals: Vec<Link>,
}

impl ComputerResponse {
    pub fn new(computer: ComputerDBResponse, peripherals: &[PeripheralDBResponse], origin: &RequestOrigin) -> Self {
        Self {
            self_link: origin.computer_url(&computer.id),
            peripherals: peripherals
                .iter()
                .map(|p| Link {
                    id: p.id,
                    self_link: origin.peripheral_url(&p.id),
                })
                .collect(),
            id: computer.id,
            manufacturer: computer.manufacturer,
            model: computer.model,
            serial_number: computer.serial_number,
            owner: computer.owner,
        }
    }
}
