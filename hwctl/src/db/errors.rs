use thiserror::Error;

/// Unified error type for entity store operations that application code can handle
#[derive(Error, Debug)]
pub enum StoreError {
    /// Entity not found by the given key (or not visible to the requesting owner)
    #[error("Entity not found")]
    NotFound,

    /// A continuation cursor that this store did not produce
    #[error("Invalid pagination cursor")]
    InvalidCursor,

    /// A stored entity is missing a property or holds one of the wrong type
    #[error("Stored {kind} entity {key} is malformed: {reason}")]
    Corrupt { kind: String, key: String, reason: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error, keeping row-not-found distinguishable
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Other(anyhow::Error::from(other)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Other(anyhow::Error::from(err))
    }
}

/// Type alias for store operation results
pub type Result<T> = std::result::Result<T, StoreError>;
