//! Common type definitions shared across layers.
//!
//! # ID Types
//!
//! Entity identifiers are assigned by the entity store and are UUIDs wrapped in type aliases:
//!
//! - [`ComputerId`]: Computer identifier
//! - [`PeripheralId`]: Peripheral identifier
//!
//! # Request context
//!
//! [`Subject`] is the authenticated caller and [`RequestContext`] carries it together with a
//! correlation id. Both are passed explicitly into repository and relationship calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Type aliases for IDs
pub type ComputerId = Uuid;
pub type PeripheralId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Parse an identifier taken from a URL path.
///
/// Malformed identifiers can never name a stored entity, so callers treat `None` exactly like
/// an absent entity.
pub fn parse_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

/// Authenticated subject identifier (the `sub` claim of a verified token).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subject(String);

impl Subject {
    pub fn new(sub: impl Into<String>) -> Self {
        Self(sub.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request context handed to every repository and relationship call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: Uuid,
    pub subject: Option<Subject>,
}

impl RequestContext {
    pub fn new(correlation_id: Uuid, subject: Option<Subject>) -> Self {
        Self { correlation_id, subject }
    }

    /// Context for work that is not tied to an inbound request (tests, startup tasks).
    pub fn detached() -> Self {
        Self::new(Uuid::new_v4(), None)
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }
}

// Operations an owner-scoped access check is performed for, used in log and error messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Update,
    Delete,
    Attach,
    Detach,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
            Operation::Attach => write!(f, "attach to"),
            Operation::Detach => write!(f, "detach from"),
        }
    }
}
