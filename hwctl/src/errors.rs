use crate::db::errors::StoreError;
use crate::relationships::RelationshipError;
use crate::types::Operation;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

pub const ATTACH_NOT_FOUND: &str = "The specified computer and/or peripheral don\u{2019}t exist";
pub const ALREADY_ATTACHED: &str = "The specified peripheral is already assigned to a computer.";
pub const DETACH_NOT_FOUND: &str = "No computer with this computer_id has a peripheral with this peripheral_id";
pub const PERIPHERAL_NOT_FOUND: &str = "No peripheral with this peripheral_id exists";

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Owner-scoped resource is absent or belongs to someone else. The two cases are
    /// indistinguishable to the caller and the response body is empty.
    #[error("Not allowed to {operation} {resource}")]
    Forbidden { operation: Operation, resource: String },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found (resources that are not owner-scoped)
    #[error("{message}")]
    NotFound { message: String },

    /// Relationship conflict, e.g. attaching an already attached peripheral
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// `Accept` header excludes JSON
    #[error("Not Acceptable")]
    NotAcceptable,

    /// Write request body is not declared as JSON
    #[error("Unsupported media type")]
    UnsupportedMediaType,

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Entity store operation error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::FORBIDDEN,
            Error::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Error::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => StatusCode::NOT_FOUND,
                StoreError::InvalidCursor => StatusCode::BAD_REQUEST,
                StoreError::Corrupt { .. } | StoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { .. } => String::new(),
            Error::BadRequest { message } | Error::NotFound { message } | Error::Conflict { message } => message.clone(),
            Error::NotAcceptable => "Not Acceptable".to_string(),
            Error::UnsupportedMediaType => "Server only accepts application/json data".to_string(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Store(store_err) => match store_err {
                StoreError::NotFound => "Resource not found".to_string(),
                StoreError::InvalidCursor => "The supplied cursor is not valid for this collection".to_string(),
                StoreError::Corrupt { .. } | StoreError::Other(_) => "Entity store error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Store(StoreError::Corrupt { .. } | StoreError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::BadRequest { .. }
            | Error::NotFound { .. }
            | Error::NotAcceptable
            | Error::UnsupportedMediaType
            | Error::Store(_) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            // No body: the caller must not learn whether the resource exists
            Error::Forbidden { .. } => status.into_response(),
            Error::BadRequest { .. }
            | Error::NotFound { .. }
            | Error::Conflict { .. }
            | Error::Store(StoreError::InvalidCursor | StoreError::NotFound) => {
                (status, Json(json!({ "Error": self.user_message() }))).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Map relationship outcomes for the attach endpoint.
pub fn attach_error(err: RelationshipError) -> Error {
    match err {
        RelationshipError::ComputerNotFound | RelationshipError::PeripheralNotFound | RelationshipError::NotAttached => {
            Error::NotFound {
                message: ATTACH_NOT_FOUND.to_string(),
            }
        }
        RelationshipError::AlreadyAttached => Error::Conflict {
            message: ALREADY_ATTACHED.to_string(),
        },
        other => other.into(),
    }
}

/// Map relationship outcomes for the detach endpoint.
pub fn detach_error(err: RelationshipError) -> Error {
    match err {
        RelationshipError::ComputerNotFound | RelationshipError::PeripheralNotFound | RelationshipError::NotAttached => {
            Error::NotFound {
                message: DETACH_NOT_FOUND.to_string(),
            }
        }
        other => other.into(),
    }
}

impl From<RelationshipError> for Error {
    fn from(err: RelationshipError) -> Self {
        match err {
            RelationshipError::ComputerNotFound => Error::Forbidden {
                operation: Operation::Read,
                resource: "computer".to_string(),
            },
            RelationshipError::Forbidden { operation } => Error::Forbidden {
                operation,
                resource: "computer".to_string(),
            },
            RelationshipError::PeripheralNotFound | RelationshipError::NotAttached => Error::NotFound {
                message: DETACH_NOT_FOUND.to_string(),
            },
            RelationshipError::AlreadyAttached => Error::Conflict {
                message: ALREADY_ATTACHED.to_string(),
            },
            RelationshipError::CascadeIncomplete { .. } | RelationshipError::CascadeUnsettled { .. } => Error::Internal {
                operation: format!("delete computer ({err}); retry the request"),
            },
            RelationshipError::Store(e) => Error::Store(e),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
