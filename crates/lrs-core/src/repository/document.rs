//! # State Document Store
//!
//! State documents support two write paths:
//! - `save` / `delete`: applied to the backend before the call returns
//! - `save_deferred` / `delete_deferred`: queued in the deferred buffer
//!
//! The buffer is invisible to reads and is drained only by `commit`.
//!
//! ## Commit semantics
//!
//! `commit` applies buffered operations one at a time, in enqueue order.
//! Each applied operation is removed from the buffer. On the first failure
//! commit stops and returns `SaveFailed` or `DeleteFailed`; the failing
//! operation and every later one stay buffered. Operations applied before
//! the failure are not rolled back. Upserts and deletes are idempotent, so
//! calling `commit` again resumes where the failed attempt stopped.

use super::batch::WriteBatch;
use super::state::{validate_key, validate_payload};
use super::{DeferredOp, Repository};
use crate::filter::{RecordFilter, StateDocumentsFilter};
use crate::formats::{decode_record, encode_record};
use crate::storage::{Backend, Table};
use crate::{LrsError, StateDocument, StateKey};
use serde::{Deserialize, Serialize};

/// Stored form of a state document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredDocument {
    seq: u64,
    document: StateDocument,
}

/// State document storage contract.
pub trait StateDocumentRepository {
    /// Find the document with `state_id` under the filter's activity and
    /// agent. `None` when nothing matches.
    ///
    /// Fails with `InvalidFilter` if the filter lacks an activity or agent.
    /// Without a registration in the filter, the earliest stored match wins.
    fn find(
        &self,
        state_id: &str,
        filter: &StateDocumentsFilter,
    ) -> Result<Option<StateDocument>, LrsError>;

    /// Every document matching the filter, in insertion order.
    fn find_by(&self, filter: &StateDocumentsFilter) -> Result<Vec<StateDocument>, LrsError>;

    /// Insert or replace a document now.
    fn save(&mut self, document: &StateDocument) -> Result<(), LrsError>;

    /// Buffer a save until the next `commit`.
    fn save_deferred(&mut self, document: &StateDocument);

    /// Delete a document now. Deleting an absent document is not an error.
    fn delete(&mut self, document: &StateDocument) -> Result<(), LrsError>;

    /// Buffer a delete until the next `commit`.
    fn delete_deferred(&mut self, document: &StateDocument);

    /// Apply every buffered operation in enqueue order.
    fn commit(&mut self) -> Result<(), LrsError>;

    /// Number of buffered operations.
    fn pending(&self) -> usize;
}

impl<B: Backend> StateDocumentRepository for Repository<B> {
    fn find(
        &self,
        state_id: &str,
        filter: &StateDocumentsFilter,
    ) -> Result<Option<StateDocument>, LrsError> {
        let found = self
            .scan_documents(filter)?
            .into_iter()
            .find(|d| d.key.state_id == state_id);
        tracing::trace!(state_id, found = found.is_some(), "document lookup");
        Ok(found)
    }

    fn find_by(&self, filter: &StateDocumentsFilter) -> Result<Vec<StateDocument>, LrsError> {
        self.scan_documents(filter)
    }

    fn save(&mut self, document: &StateDocument) -> Result<(), LrsError> {
        validate_key(&document.key)?;
        validate_payload(&document.data)?;
        self.write_document(document)
    }

    fn save_deferred(&mut self, document: &StateDocument) {
        tracing::debug!(state_id = %document.key.state_id, "save deferred");
        self.deferred.push_back(DeferredOp::Save(document.clone()));
    }

    fn delete(&mut self, document: &StateDocument) -> Result<(), LrsError> {
        self.remove_document(&document.key)
    }

    fn delete_deferred(&mut self, document: &StateDocument) {
        tracing::debug!(state_id = %document.key.state_id, "delete deferred");
        self.deferred.push_back(DeferredOp::Delete(document.key.clone()));
    }

    fn commit(&mut self) -> Result<(), LrsError> {
        let total = self.deferred.len();
        while let Some(op) = self.deferred.front().cloned() {
            let result = match &op {
                DeferredOp::Save(document) => self.save(document).map_err(save_failed),
                DeferredOp::Delete(key) => self.remove_document(key),
            };
            if let Err(e) = result {
                tracing::warn!(
                    applied = total - self.deferred.len(),
                    remaining = self.deferred.len(),
                    error = %e,
                    "commit stopped"
                );
                return Err(e);
            }
            self.deferred.pop_front();
        }
        tracing::debug!(applied = total, "commit complete");
        Ok(())
    }

    fn pending(&self) -> usize {
        self.deferred.len()
    }
}

impl<B: Backend> Repository<B> {
    /// Matching documents, sorted by insertion sequence.
    fn scan_documents(
        &self,
        filter: &StateDocumentsFilter,
    ) -> Result<Vec<StateDocument>, LrsError> {
        let (activity, agent) = filter.require_scope()?;
        let prefix = StateKey::scope_prefix(activity, agent);

        let mut found = Vec::new();
        for (_, bytes) in self.backend.scan(Table::StateDocuments, &prefix)? {
            let stored: StoredDocument = decode_record(&bytes)?;
            if filter.matches(&stored.document) {
                found.push(stored);
            }
        }
        found.sort_by_key(|s| s.seq);
        Ok(found.into_iter().map(|s| s.document).collect())
    }

    /// Upsert one document in its own backend transaction.
    fn write_document(&mut self, document: &StateDocument) -> Result<(), LrsError> {
        let key = document.key.storage_key();
        let mut batch = WriteBatch::new(self.next_seq);
        let seq = batch
            .record_seq(&self.backend, Table::StateDocuments, &key, |bytes| {
                decode_record::<StoredDocument>(bytes).map(|s| s.seq)
            })
            .map_err(save_failed)?;
        let record = StoredDocument {
            seq,
            document: document.clone(),
        };
        batch.put(
            Table::StateDocuments,
            key,
            encode_record(&record).map_err(save_failed)?,
        );

        let next_seq = batch.next_seq();
        let ops = batch.finish().map_err(save_failed)?;
        self.backend.apply(&ops).map_err(save_failed)?;
        self.next_seq = next_seq;
        tracing::debug!(state_id = %document.key.state_id, seq, "document saved");
        Ok(())
    }

    /// Delete one document in its own backend transaction.
    fn remove_document(&mut self, key: &StateKey) -> Result<(), LrsError> {
        self.backend
            .delete(Table::StateDocuments, &key.storage_key())
            .map_err(|e| LrsError::DeleteFailed(e.to_string()))?;
        tracing::debug!(state_id = %key.state_id, "document deleted");
        Ok(())
    }
}

/// Classify any failure on the save path as `SaveFailed`.
fn save_failed(e: LrsError) -> LrsError {
    match e {
        LrsError::SaveFailed(_) => e,
        other => LrsError::SaveFailed(other.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{Agent, DocumentData, InverseFunctionalIdentifier, Iri};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn activity() -> Iri {
        Iri::new("http://example.com/activities/lesson").expect("iri")
    }

    fn agent() -> Agent {
        Agent::named("Learner", InverseFunctionalIdentifier::mbox("learner@example.com"))
    }

    fn document(state_id: &str) -> StateDocument {
        StateDocument::new(
            StateKey::new(activity(), agent(), state_id, None),
            DocumentData::from_json(&serde_json::json!({"id": state_id})).expect("json"),
        )
    }

    fn scope() -> StateDocumentsFilter {
        StateDocumentsFilter::new()
            .by_activity(activity())
            .by_agent(agent())
    }

    #[test]
    fn save_then_find() {
        let mut repo = Repository::in_memory();
        let doc = document("bookmark");
        repo.save(&doc).expect("save");
        assert_eq!(repo.find("bookmark", &scope()).expect("find"), Some(doc));
    }

    #[test]
    fn missing_document_is_none() {
        let repo = Repository::in_memory();
        assert_eq!(repo.find("unknown-state-id", &scope()).expect("find"), None);
    }

    #[test]
    fn malformed_filter_rejected() {
        let repo = Repository::in_memory();
        let no_agent = StateDocumentsFilter::new().by_activity(activity());
        assert!(matches!(
            repo.find("bookmark", &no_agent),
            Err(LrsError::InvalidFilter(_))
        ));
        assert!(repo.find_by(&StateDocumentsFilter::new()).is_err());
    }

    #[test]
    fn deferred_save_invisible_until_commit() {
        let mut repo = Repository::in_memory();
        repo.save_deferred(&document("bookmark"));
        assert_eq!(repo.pending(), 1);
        assert!(repo.find("bookmark", &scope()).expect("find").is_none());

        repo.commit().expect("commit");
        assert_eq!(repo.pending(), 0);
        assert!(repo.find("bookmark", &scope()).expect("find").is_some());
    }

    #[test]
    fn deferred_delete_applies_on_commit() {
        let mut repo = Repository::in_memory();
        let doc = document("bookmark");
        repo.save(&doc).expect("save");
        repo.delete_deferred(&doc);
        assert!(repo.find("bookmark", &scope()).expect("find").is_some());

        repo.commit().expect("commit");
        assert!(repo.find("bookmark", &scope()).expect("find").is_none());
    }

    #[test]
    fn commit_preserves_enqueue_order() {
        let mut repo = Repository::in_memory();
        let doc = document("bookmark");
        repo.save_deferred(&doc);
        repo.delete_deferred(&doc);
        repo.commit().expect("commit");
        assert!(repo.find("bookmark", &scope()).expect("find").is_none());

        repo.delete_deferred(&doc);
        repo.save_deferred(&doc);
        repo.commit().expect("commit");
        assert!(repo.find("bookmark", &scope()).expect("find").is_some());
    }

    #[test]
    fn delete_absent_document_succeeds() {
        let mut repo = Repository::in_memory();
        repo.delete(&document("never-saved")).expect("delete");
    }

    #[test]
    fn find_by_lists_in_insertion_order() {
        let mut repo = Repository::in_memory();
        repo.save(&document("zeta")).expect("save");
        repo.save(&document("alpha")).expect("save");
        repo.save(&document("zeta")).expect("save again");

        let ids: Vec<_> = repo
            .find_by(&scope())
            .expect("find_by")
            .into_iter()
            .map(|d| d.key.state_id)
            .collect();
        assert_eq!(ids, vec!["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn find_by_since_uses_update_time() {
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single().expect("time");
        let new = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("time");
        let mut repo = Repository::in_memory();
        repo.save(&document("old").with_updated(old)).expect("save");
        repo.save(&document("new").with_updated(new)).expect("save");

        let recent = repo.find_by(&scope().since(new)).expect("find_by");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].key.state_id, "new");
    }

    #[test]
    fn registration_in_filter_selects_exact_document() {
        let registration =
            Uuid::parse_str("12345678-1234-5678-8234-567812345678").expect("uuid");
        let mut repo = Repository::in_memory();
        repo.save(&document("bookmark")).expect("save");
        let registered = StateDocument::new(
            StateKey::new(activity(), agent(), "bookmark", Some(registration)),
            DocumentData::new(b"registered".to_vec()),
        );
        repo.save(&registered).expect("save");

        let found = repo
            .find("bookmark", &scope().by_registration(registration))
            .expect("find");
        assert_eq!(found, Some(registered));
        let any = repo.find("bookmark", &scope()).expect("find");
        assert_eq!(any.map(|d| d.key.registration), Some(None));
    }

    #[test]
    fn documents_and_states_are_separate() {
        use crate::repository::StateRepository;
        let mut repo = Repository::in_memory();
        let doc = document("bookmark");
        repo.save(&doc).expect("save");
        assert!(repo.find_state(&doc.key).expect("find").is_none());
    }
}
