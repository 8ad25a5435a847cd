//! # State Store
//!
//! Key-value storage of mutable state records.
//!
//! A record is keyed by (activity, agent, state id, registration). Storing
//! under an existing key replaces the payload in place; the record keeps
//! the insertion sequence it was first stored with, so listings stay in
//! insertion order across updates.
//!
//! Lookups report absence with `None` or an empty list, never an error.

use super::batch::WriteBatch;
use super::{PendingWrite, Repository};
use crate::filter::{RecordFilter, StateDocumentsFilter};
use crate::formats::{decode_record, encode_record};
use crate::primitives::{MAX_DOCUMENT_SIZE, MAX_STATE_ID_LENGTH};
use crate::storage::{Backend, Table};
use crate::{DocumentData, LrsError, State, StateKey};
use serde::{Deserialize, Serialize};

/// Stored form of a state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(super) struct StoredState {
    pub(super) seq: u64,
    pub(super) state: State,
}

/// State storage contract.
pub trait StateRepository {
    /// Point lookup by the full key. `None` when nothing is stored.
    fn find_state(&self, key: &StateKey) -> Result<Option<State>, LrsError>;

    /// Every state sharing the key's activity and agent, in insertion
    /// order. The state id is ignored; a `None` registration matches any.
    fn find_states(&self, key: &StateKey) -> Result<Vec<State>, LrsError>;

    /// Insert or replace a state.
    fn store_state(&mut self, state: &State, flush: bool) -> Result<(), LrsError>;

    /// Remove a state. Removing an absent key is a no-op.
    fn remove_state(&mut self, key: &StateKey, flush: bool) -> Result<(), LrsError>;
}

impl<B: Backend> StateRepository for Repository<B> {
    fn find_state(&self, key: &StateKey) -> Result<Option<State>, LrsError> {
        let stored = self
            .backend
            .get(Table::States, &key.storage_key())?
            .map(|bytes| decode_record::<StoredState>(&bytes))
            .transpose()?;
        Ok(stored.map(|s| s.state))
    }

    fn find_states(&self, key: &StateKey) -> Result<Vec<State>, LrsError> {
        let filter = StateDocumentsFilter::for_key(key);
        let prefix = StateKey::scope_prefix(&key.activity, &key.agent);

        let mut found = Vec::new();
        for (_, bytes) in self.backend.scan(Table::States, &prefix)? {
            let stored: StoredState = decode_record(&bytes)?;
            if filter.matches(&stored.state.key) {
                found.push(stored);
            }
        }
        found.sort_by_key(|s| s.seq);
        Ok(found.into_iter().map(|s| s.state).collect())
    }

    fn store_state(&mut self, state: &State, flush: bool) -> Result<(), LrsError> {
        validate_key(&state.key)?;
        validate_payload(&state.data)?;
        tracing::debug!(state_id = %state.key.state_id, flush, "storing state");
        self.enqueue(PendingWrite::PutState(state.clone()), flush)
    }

    fn remove_state(&mut self, key: &StateKey, flush: bool) -> Result<(), LrsError> {
        tracing::debug!(state_id = %key.state_id, flush, "removing state");
        self.enqueue(PendingWrite::RemoveState(key.clone()), flush)
            .map_err(|e| match e {
                LrsError::SaveFailed(msg) => LrsError::DeleteFailed(msg),
                other => other,
            })
    }
}

impl<B: Backend> Repository<B> {
    /// Stage a state upsert, keeping the original sequence of a known key.
    pub(super) fn stage_state(
        &self,
        batch: &mut WriteBatch,
        state: &State,
    ) -> Result<(), LrsError> {
        let key = state.key.storage_key();
        let seq = batch.record_seq(&self.backend, Table::States, &key, |bytes| {
            decode_record::<StoredState>(bytes).map(|s| s.seq)
        })?;
        let record = StoredState {
            seq,
            state: state.clone(),
        };
        batch.put(Table::States, key, encode_record(&record)?);
        Ok(())
    }
}

/// Reject state ids the store cannot key.
pub(super) fn validate_key(key: &StateKey) -> Result<(), LrsError> {
    if key.state_id.is_empty() {
        return Err(LrsError::InvalidIdentifier("empty state id".to_string()));
    }
    if key.state_id.len() > MAX_STATE_ID_LENGTH {
        return Err(LrsError::InvalidIdentifier(format!(
            "state id exceeds {} bytes",
            MAX_STATE_ID_LENGTH
        )));
    }
    Ok(())
}

/// Reject payloads above the document size limit.
pub(super) fn validate_payload(data: &DocumentData) -> Result<(), LrsError> {
    if data.as_bytes().len() > MAX_DOCUMENT_SIZE {
        return Err(LrsError::SaveFailed(format!(
            "payload of {} bytes exceeds maximum allowed {} bytes",
            data.as_bytes().len(),
            MAX_DOCUMENT_SIZE
        )));
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{Agent, InverseFunctionalIdentifier, Iri};
    use serde_json::json;
    use uuid::Uuid;

    fn key(state_id: &str, registration: Option<Uuid>) -> StateKey {
        StateKey::new(
            Iri::new("http://example.com/activities/lesson").expect("iri"),
            Agent::new(InverseFunctionalIdentifier::mbox("learner@example.com")),
            state_id,
            registration,
        )
    }

    fn state(state_id: &str, value: serde_json::Value) -> State {
        State::new(
            key(state_id, None),
            DocumentData::from_json(&value).expect("json"),
        )
    }

    #[test]
    fn upsert_replaces_payload() {
        let mut repo = Repository::in_memory();
        repo.store_state(&state("bookmark", json!({"progression": 0.5})), true)
            .expect("store");
        repo.store_state(&state("bookmark", json!({"progression": 0.9})), true)
            .expect("store");

        let found = repo.find_state(&key("bookmark", None)).expect("find");
        let value: serde_json::Value = found.expect("present").data.to_json().expect("json");
        assert_eq!(value, json!({"progression": 0.9}));
        assert_eq!(repo.find_states(&key("any", None)).expect("list").len(), 1);
    }

    #[test]
    fn update_keeps_insertion_position() {
        let mut repo = Repository::in_memory();
        repo.store_state(&state("z-first", json!(1)), true).expect("store");
        repo.store_state(&state("a-second", json!(2)), true).expect("store");
        repo.store_state(&state("z-first", json!(3)), true).expect("store");

        let ids: Vec<_> = repo
            .find_states(&key("ignored", None))
            .expect("list")
            .into_iter()
            .map(|s| s.key.state_id)
            .collect();
        assert_eq!(ids, vec!["z-first".to_string(), "a-second".to_string()]);
    }

    #[test]
    fn registration_scopes_listing() {
        let registration =
            Uuid::parse_str("12345678-1234-5678-8234-567812345678").expect("uuid");
        let mut repo = Repository::in_memory();
        repo.store_state(&State::new(key("a", None), DocumentData::default()), true)
            .expect("store");
        repo.store_state(
            &State::new(key("b", Some(registration)), DocumentData::default()),
            true,
        )
        .expect("store");

        assert_eq!(repo.find_states(&key("x", None)).expect("list").len(), 2);
        let scoped = repo
            .find_states(&key("x", Some(registration)))
            .expect("list");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].key.state_id, "b");

        assert!(repo.find_state(&key("b", None)).expect("find").is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut repo = Repository::in_memory();
        repo.store_state(&state("bookmark", json!({})), true).expect("store");
        repo.remove_state(&key("bookmark", None), true).expect("remove");
        assert!(repo.find_state(&key("bookmark", None)).expect("find").is_none());
        repo.remove_state(&key("bookmark", None), true)
            .expect("remove again");
    }

    #[test]
    fn queued_put_then_remove_leaves_nothing() {
        let mut repo = Repository::in_memory();
        repo.store_state(&state("bookmark", json!({})), false).expect("store");
        repo.remove_state(&key("bookmark", None), false).expect("remove");
        repo.flush().expect("flush");
        assert!(repo.find_state(&key("bookmark", None)).expect("find").is_none());
    }

    #[test]
    fn invalid_state_ids_rejected() {
        let mut repo = Repository::in_memory();
        let empty = State::new(key("", None), DocumentData::default());
        assert!(matches!(
            repo.store_state(&empty, true),
            Err(LrsError::InvalidIdentifier(_))
        ));
        let long = State::new(
            key(&"x".repeat(MAX_STATE_ID_LENGTH + 1), None),
            DocumentData::default(),
        );
        assert!(repo.store_state(&long, true).is_err());
        assert_eq!(repo.pending_writes(), 0);
    }

    #[test]
    fn other_agents_states_not_listed() {
        let mut repo = Repository::in_memory();
        repo.store_state(&state("bookmark", json!({})), true).expect("store");
        let other = StateKey::new(
            Iri::new("http://example.com/activities/lesson").expect("iri"),
            Agent::new(InverseFunctionalIdentifier::mbox("other@example.com")),
            "bookmark",
            None,
        );
        assert!(repo.find_states(&other).expect("list").is_empty());
        assert!(repo.find_state(&other).expect("find").is_none());
    }
}
