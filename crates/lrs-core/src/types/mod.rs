//! # Core Type Definitions
//!
//! This module contains the value objects handled by the record store:
//! - Identifiers (`StatementId`, `Iri`)
//! - Actors (`Agent`, `Group`, `Actor`, `Person`)
//! - Statements (`Verb`, `Activity`, `StatementObject`, `Context`, `Statement`)
//! - State records (`StateKey`, `State`, `StateDocument`, `DocumentData`)
//! - Error types (`LrsError`)
//!
//! ## Ordering Guarantees
//!
//! Every collection inside a value object is a `Vec` (order-preserving) or a
//! `BTreeMap` (sorted), so two structurally equal values always encode to the
//! same bytes.

mod actor;
mod state;
mod statement;

pub use actor::{Account, Actor, Agent, Group, InverseFunctionalIdentifier, Person};
pub use state::{DocumentData, State, StateDocument, StateKey};
pub use statement::{
    Activity, ActivityDefinition, Context, ContextActivities, LanguageMap, Statement,
    StatementObject, Verb,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier of a statement.
///
/// Always a UUID; rendered in the canonical lowercase hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatementId(pub Uuid);

impl StatementId {
    /// Wrap an existing UUID.
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw 16-byte form used as a storage key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for StatementId {
    type Err = LrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| LrsError::InvalidIdentifier(format!("{}: {}", s, e)))
    }
}

/// An internationalized resource identifier.
///
/// Activities and verbs are identified by IRIs. Comparison is exact string
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Iri(String);

impl Iri {
    /// Create an IRI, rejecting empty strings.
    pub fn new(s: impl Into<String>) -> Result<Self, LrsError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(LrsError::InvalidIdentifier("empty IRI".to_string()));
        }
        Ok(Self(s))
    }

    /// Get the IRI as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Iri {
    type Err = LrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Iri {
    type Error = LrsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the record store.
///
/// - No silent failures
/// - Backend failures are wrapped into these kinds at the repository boundary
/// - Nothing is retried internally; retry policy belongs to the caller
#[derive(Debug, Error)]
pub enum LrsError {
    /// The requested entity does not exist under the queried identity,
    /// void-state or authority.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write to the backend failed.
    #[error("Save failed: {0}")]
    SaveFailed(String),

    /// A delete from the backend failed.
    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    /// A different statement is already stored under this id.
    #[error("Statement conflict: {0} already exists with different content")]
    StatementConflict(StatementId),

    /// The statement violates a storage rule (e.g. a voiding statement that
    /// does not reference a statement).
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    /// The filter is missing fields the lookup requires.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An identifier (UUID, IRI) could not be parsed.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O or backend error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LrsError {
    /// True for the `NotFound` kind.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_id_roundtrips_through_text() {
        let text = "12345678-1234-5678-8234-567812345678";
        let id: StatementId = text.parse().expect("parse");
        assert_eq!(id.to_string(), text);
    }

    #[test]
    fn statement_id_display_is_lowercase() {
        let id: StatementId = "ABCDEF01-2345-4678-8234-567812345678"
            .parse()
            .expect("parse");
        assert_eq!(id.to_string(), "abcdef01-2345-4678-8234-567812345678");
    }

    #[test]
    fn malformed_statement_id_rejected() {
        let result = "not-a-uuid".parse::<StatementId>();
        assert!(matches!(result, Err(LrsError::InvalidIdentifier(_))));
    }

    #[test]
    fn empty_iri_rejected() {
        assert!(Iri::new("").is_err());
        assert!(Iri::new("   ").is_err());
        assert!(Iri::new("http://example.com/activity").is_ok());
    }

    #[test]
    fn empty_iri_rejected_when_deserialized() {
        assert!(serde_json::from_str::<Iri>("\"\"").is_err());
        assert!(serde_json::from_str::<Iri>("\" \"").is_err());
        let iri: Iri = serde_json::from_str("\"http://example.com/activity\"").expect("iri");
        assert_eq!(iri.as_str(), "http://example.com/activity");
    }

    #[test]
    fn not_found_predicate() {
        assert!(LrsError::NotFound("x".into()).is_not_found());
        assert!(!LrsError::IoError("x".into()).is_not_found());
    }
}
