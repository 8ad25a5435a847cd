//! # Repository
//!
//! `Repository<B>` implements every store contract over one `Backend`:
//! - `StatementRepository`: append-only statements with voiding
//! - `StateRepository`: upserted state records
//! - `StateDocumentRepository`: state documents with a deferred buffer
//! - `ActivityRepository` / `PersonRepository`: views derived from statements
//!
//! ## Write paths
//!
//! Statement and state writes go through the *flush queue*. A write made
//! with `flush = false` is queued and stays invisible to reads. The next
//! `flush = true` write, or an explicit [`Repository::flush`], applies the
//! whole queue plus that write in one backend batch.
//!
//! State documents have their own *deferred buffer*, drained only by
//! `commit`. Commit applies one operation at a time and stops at the first
//! failure, leaving the failed operation and everything after it queued.
//!
//! Neither queue is shared between repository instances.

mod activity;
mod batch;
mod document;
mod person;
mod state;
mod statement;

pub use activity::ActivityRepository;
pub use document::StateDocumentRepository;
pub use person::PersonRepository;
pub use state::StateRepository;
pub use statement::StatementRepository;

use crate::primitives::MAX_PENDING_WRITES;
use crate::storage::{Backend, MemoryBackend, RedbBackend, StorageBackend, Table};
use crate::{LrsError, State, StateDocument, StateKey, Statement, StatementId};
use batch::WriteBatch;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use uuid::Uuid;

/// Metadata key of the insertion sequence counter.
pub(crate) const NEXT_SEQ_KEY: &[u8] = b"next_seq";

/// A write waiting in the flush queue.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingWrite {
    Statement(Statement),
    PutState(State),
    RemoveState(StateKey),
}

/// A document operation waiting in the deferred buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DeferredOp {
    Save(StateDocument),
    Delete(StateKey),
}

/// Record counts for one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    pub statements: usize,
    pub voided: usize,
    pub states: usize,
    pub state_documents: usize,
    pub activities: usize,
    pub agents: usize,
    /// Writes in the flush queue.
    pub pending_writes: usize,
    /// Operations in the deferred document buffer.
    pub deferred_documents: usize,
}

/// The record store over a backend `B`.
pub struct Repository<B: Backend> {
    /// The storage backend.
    backend: B,
    /// Next insertion sequence number.
    next_seq: u64,
    /// In-memory copy of the void index: voided id -> voiding id.
    voids: BTreeMap<StatementId, StatementId>,
    /// Flush queue for statements and states.
    pending: Vec<PendingWrite>,
    /// Deferred buffer for state documents.
    deferred: VecDeque<DeferredOp>,
}

impl<B: Backend + std::fmt::Debug> std::fmt::Debug for Repository<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("backend", &self.backend)
            .field("next_seq", &self.next_seq)
            .field("voids", &self.voids.len())
            .field("pending", &self.pending.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

impl Repository<MemoryBackend> {
    /// Create an empty in-memory repository.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: MemoryBackend::new(),
            next_seq: 0,
            voids: BTreeMap::new(),
            pending: Vec::new(),
            deferred: VecDeque::new(),
        }
    }
}

impl Repository<RedbBackend> {
    /// Open or create a redb-backed repository at `path`.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, LrsError> {
        Self::new(RedbBackend::open(path)?)
    }
}

impl Repository<StorageBackend> {
    /// Open a repository over a runtime-selected backend.
    pub fn open(backend: StorageBackend) -> Result<Self, LrsError> {
        Self::new(backend)
    }
}

impl<B: Backend> Repository<B> {
    /// Wrap a backend, loading the sequence counter and the void index.
    pub fn new(backend: B) -> Result<Self, LrsError> {
        let next_seq = match backend.get(Table::Metadata, NEXT_SEQ_KEY)? {
            Some(bytes) => seq_from_bytes(&bytes)?,
            None => 0,
        };

        let mut voids = BTreeMap::new();
        for (target, voider) in backend.scan(Table::Voids, &[])? {
            voids.insert(id_from_bytes(&target)?, id_from_bytes(&voider)?);
        }

        tracing::debug!(next_seq, voids = voids.len(), "repository opened");
        Ok(Self {
            backend,
            next_seq,
            voids,
            pending: Vec::new(),
            deferred: VecDeque::new(),
        })
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    ///
    /// Writing through it bypasses the repository's caches.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of writes waiting in the flush queue.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Apply every queued statement and state write as one backend batch.
    ///
    /// On failure nothing is applied and the queue is left intact.
    pub fn flush(&mut self) -> Result<(), LrsError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let writes = std::mem::take(&mut self.pending);
        match self.apply_writes(&writes) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(queued = writes.len(), error = %e, "flush failed");
                self.pending = writes;
                Err(e)
            }
        }
    }

    /// Record counts per keyspace plus queue lengths.
    pub fn stats(&self) -> Result<StoreStats, LrsError> {
        Ok(StoreStats {
            statements: self.backend.count(Table::Statements)?,
            voided: self.voids.len(),
            states: self.backend.count(Table::States)?,
            state_documents: self.backend.count(Table::StateDocuments)?,
            activities: self.backend.count(Table::Activities)?,
            agents: self.backend.count(Table::Agents)?,
            pending_writes: self.pending.len(),
            deferred_documents: self.deferred.len(),
        })
    }

    // =========================================================================
    // FLUSH QUEUE
    // =========================================================================

    /// Queue `write`, applying the queue when `flush` is set or the queue
    /// is full.
    ///
    /// A write whose flush fails is dropped from the queue, whether the
    /// flush was asked for or forced by a full queue; writes queued before
    /// it stay queued.
    fn enqueue(&mut self, write: PendingWrite, flush: bool) -> Result<(), LrsError> {
        if !flush {
            self.pending.push(write);
            if self.pending.len() >= MAX_PENDING_WRITES {
                tracing::debug!(queued = self.pending.len(), "flush queue full");
                if let Err(e) = self.flush() {
                    self.pending.pop();
                    return Err(e);
                }
            }
            return Ok(());
        }

        let mut writes = std::mem::take(&mut self.pending);
        writes.push(write);
        match self.apply_writes(&writes) {
            Ok(()) => Ok(()),
            Err(e) => {
                writes.pop();
                tracing::warn!(queued = writes.len(), error = %e, "write failed");
                self.pending = writes;
                Err(e)
            }
        }
    }

    /// Stage `writes` into one batch and apply it.
    fn apply_writes(&mut self, writes: &[PendingWrite]) -> Result<(), LrsError> {
        let mut batch = WriteBatch::new(self.next_seq);
        for write in writes {
            match write {
                PendingWrite::Statement(statement) => self.stage_statement(&mut batch, statement)?,
                PendingWrite::PutState(state) => self.stage_state(&mut batch, state)?,
                PendingWrite::RemoveState(key) => {
                    batch.delete(Table::States, key.storage_key());
                }
            }
        }

        let next_seq = batch.next_seq();
        let voids = batch.voids().clone();
        let ops = batch.finish()?;
        self.backend
            .apply(&ops)
            .map_err(|e| LrsError::SaveFailed(e.to_string()))?;

        self.next_seq = next_seq;
        self.voids.extend(voids);
        tracing::debug!(writes = writes.len(), ops = ops.len(), "flushed");
        Ok(())
    }

    /// Queued statement with the given id, if any.
    fn pending_statement(&self, id: StatementId) -> Option<&Statement> {
        self.pending.iter().find_map(|w| match w {
            PendingWrite::Statement(s) if s.id == Some(id) => Some(s),
            _ => None,
        })
    }
}

// =============================================================================
// KEY HELPERS
// =============================================================================

fn seq_from_bytes(bytes: &[u8]) -> Result<u64, LrsError> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| {
        LrsError::DeserializationError(format!("invalid sequence length: {}", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(raw))
}

fn id_from_bytes(bytes: &[u8]) -> Result<StatementId, LrsError> {
    Uuid::from_slice(bytes)
        .map(StatementId::new)
        .map_err(|e| LrsError::DeserializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{
        Activity, Agent, DocumentData, InverseFunctionalIdentifier, Iri, StatementObject,
        StatementsFilter, Verb,
    };
    use tempfile::tempdir;

    fn statement() -> Statement {
        Statement::new(
            Agent::new(InverseFunctionalIdentifier::mbox("learner@example.com")),
            Verb::new(Iri::new("http://adlnet.gov/expapi/verbs/attempted").expect("iri")),
            StatementObject::Activity(Activity::new(
                Iri::new("http://example.com/activities/lesson").expect("iri"),
            )),
        )
    }

    fn state(id: &str) -> State {
        State::new(
            StateKey::new(
                Iri::new("http://example.com/activities/lesson").expect("iri"),
                Agent::new(InverseFunctionalIdentifier::mbox("learner@example.com")),
                id,
                None,
            ),
            DocumentData::new(b"{}".to_vec()),
        )
    }

    #[test]
    fn queued_writes_invisible_until_flush() {
        let mut repo = Repository::in_memory();
        let id = repo.store_statement(&statement(), false).expect("store");
        repo.store_state(&state("bookmark"), false).expect("store");
        assert_eq!(repo.pending_writes(), 2);

        assert!(repo.find_statement_by_id(id, None).is_err());
        assert!(repo.find_state(&state("bookmark").key).expect("find").is_none());

        repo.flush().expect("flush");
        assert_eq!(repo.pending_writes(), 0);
        assert!(repo.find_statement_by_id(id, None).is_ok());
        assert!(repo.find_state(&state("bookmark").key).expect("find").is_some());
    }

    #[test]
    fn flush_true_write_drains_queue() {
        let mut repo = Repository::in_memory();
        let queued = repo.store_statement(&statement(), false).expect("store");
        repo.store_state(&state("bookmark"), true).expect("store");

        assert_eq!(repo.pending_writes(), 0);
        assert!(repo.find_statement_by_id(queued, None).is_ok());
    }

    #[test]
    fn flush_of_empty_queue_is_noop() {
        let mut repo = Repository::in_memory();
        repo.flush().expect("flush");
        assert_eq!(repo.stats().expect("stats"), StoreStats::default());
    }

    #[test]
    fn sequence_and_voids_survive_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        let (target, voider) = {
            let mut repo = Repository::open_redb(&db_path).expect("open db");
            let target = repo.store_statement(&statement(), true).expect("store");
            let voiding = Statement::voiding(
                Agent::new(InverseFunctionalIdentifier::mbox("admin@example.com")),
                target,
            );
            let voider = repo.store_statement(&voiding, true).expect("store");
            (target, voider)
        };

        let mut repo = Repository::open_redb(&db_path).expect("reopen db");
        assert!(repo.find_voided_statement_by_id(target, None).is_ok());
        assert!(repo.find_voided_statement_by_id(voider, None).is_ok());

        let third = repo.store_statement(&statement(), true).expect("store");
        let listed: Vec<_> = repo
            .find_statements_by(&StatementsFilter::new(), None)
            .expect("list")
            .into_iter()
            .filter_map(|s| s.id)
            .collect();
        assert_eq!(listed, vec![third]);
    }

    #[test]
    fn stats_count_records() {
        let mut repo = Repository::in_memory();
        repo.store_statement(&statement(), true).expect("store");
        repo.store_state(&state("a"), true).expect("store");
        repo.store_state(&state("b"), false).expect("store");

        let stats = repo.stats().expect("stats");
        assert_eq!(stats.statements, 1);
        assert_eq!(stats.states, 1);
        assert_eq!(stats.activities, 1);
        assert_eq!(stats.agents, 1);
        assert_eq!(stats.pending_writes, 1);
    }

    #[test]
    fn runtime_selected_backend() {
        let mut repo = Repository::open(StorageBackend::default()).expect("open");
        let id = repo.store_statement(&statement(), true).expect("store");
        assert!(repo.find_statement_by_id(id, None).is_ok());
        assert!(!repo.backend().is_persistent());
    }
}
