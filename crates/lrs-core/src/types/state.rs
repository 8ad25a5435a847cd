//! Mutable state records scoped to (activity, agent, state id, registration).

use super::{Agent, Iri, LrsError};
use crate::primitives::DEFAULT_CONTENT_TYPE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque document payload.
///
/// The store never interprets these bytes. JSON helpers are provided for
/// callers that keep JSON documents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentData(pub Vec<u8>);

impl DocumentData {
    /// Wrap raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Serialize a value as JSON.
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, LrsError> {
        serde_json::to_vec(value)
            .map(Self)
            .map_err(|e| LrsError::SerializationError(e.to_string()))
    }

    /// Parse the payload as JSON.
    pub fn to_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, LrsError> {
        serde_json::from_slice(&self.0).map_err(|e| LrsError::DeserializationError(e.to_string()))
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// True for an empty payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The unique key of a state record.
///
/// A `None` registration is its own key value, distinct from every concrete
/// registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateKey {
    pub activity: Iri,
    pub agent: Agent,
    pub state_id: String,
    pub registration: Option<Uuid>,
}

impl StateKey {
    /// Create a key.
    #[must_use]
    pub fn new(
        activity: Iri,
        agent: Agent,
        state_id: impl Into<String>,
        registration: Option<Uuid>,
    ) -> Self {
        Self {
            activity,
            agent,
            state_id: state_id.into(),
            registration,
        }
    }

    /// Storage key bytes.
    ///
    /// Built from the activity IRI, the agent's IFI, the registration and the
    /// state id, each length-prefixed so no two distinct keys collide. Agent
    /// names do not take part.
    #[must_use]
    pub fn storage_key(&self) -> Vec<u8> {
        let registration = self
            .registration
            .map(|r| r.hyphenated().to_string())
            .unwrap_or_default();
        let mut key = Self::scope_prefix(&self.activity, &self.agent);
        push_part(&mut key, &registration);
        push_part(&mut key, &self.state_id);
        key
    }

    /// Common prefix of every storage key under (activity, agent).
    #[must_use]
    pub fn scope_prefix(activity: &Iri, agent: &Agent) -> Vec<u8> {
        let mut key = Vec::new();
        push_part(&mut key, activity.as_str());
        push_part(&mut key, &agent.ifi.key());
        key
    }

    /// True if `other` names the same record (agent compared by IFI).
    #[must_use]
    pub fn is_same(&self, other: &StateKey) -> bool {
        self.activity == other.activity
            && self.agent.is_same(&other.agent)
            && self.state_id == other.state_id
            && self.registration == other.registration
    }
}

fn push_part(key: &mut Vec<u8>, part: &str) {
    key.extend_from_slice(&(part.len() as u32).to_be_bytes());
    key.extend_from_slice(part.as_bytes());
}

/// A state record: key plus payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub key: StateKey,
    pub data: DocumentData,
}

impl State {
    /// Create a state record.
    #[must_use]
    pub fn new(key: StateKey, data: DocumentData) -> Self {
        Self { key, data }
    }
}

/// A state record stored as a document, with content metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDocument {
    pub key: StateKey,
    pub data: DocumentData,
    pub content_type: String,
    pub updated: DateTime<Utc>,
}

impl StateDocument {
    /// Create a JSON document stamped with the current time.
    #[must_use]
    pub fn new(key: StateKey, data: DocumentData) -> Self {
        Self {
            key,
            data,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            updated: Utc::now(),
        }
    }

    /// Return a copy with a different content type.
    #[must_use]
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            ..self
        }
    }

    /// Return a copy with a different update time.
    #[must_use]
    pub fn with_updated(self, updated: DateTime<Utc>) -> Self {
        Self { updated, ..self }
    }
}
