//! # lrs-core
//!
//! The persistence core of an xAPI learning record store - THE LOGIC.
//!
//! This crate owns the storage semantics of the record store:
//! - Statements are immutable and append-only; ids are generated when absent
//! - Voiding is a new statement that hides its target from normal lookups
//! - State records are upserted in place and physically deleted
//! - State documents add a deferred buffer drained by an explicit commit
//!
//! ## Layout
//!
//! - `types`: value objects (statements, actors, state records, errors)
//! - `filter`: statement and state-document filters
//! - `identity`: statement id generation
//! - `formats`: versioned record encoding
//! - `storage`: the `Backend` trait with in-memory and redb implementations
//! - `repository`: `Repository<B>` implementing every store contract
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Wire formats (xAPI JSON documents, HTTP) live outside this crate
//! - Ordering is deterministic: `BTreeMap` keyspaces and insertion sequences

// =============================================================================
// MODULES
// =============================================================================

pub mod filter;
pub mod formats;
pub mod identity;
pub mod primitives;
pub mod repository;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Account, Activity, ActivityDefinition, Actor, Agent, Context, ContextActivities,
    DocumentData, Group, InverseFunctionalIdentifier, Iri, LanguageMap, LrsError, Person, State,
    StateDocument, StateKey, Statement, StatementId, StatementObject, Verb,
};

// =============================================================================
// RE-EXPORTS: Filters and Identity
// =============================================================================

pub use filter::{RecordFilter, StateDocumentsFilter, StatementsFilter, matches};
pub use identity::{is_canonical_uuid, new_statement_id};

// =============================================================================
// RE-EXPORTS: Storage and Repository
// =============================================================================

pub use repository::{
    ActivityRepository, PersonRepository, Repository, StateDocumentRepository, StateRepository,
    StatementRepository, StoreStats,
};
pub use storage::{Backend, MemoryBackend, RedbBackend, StorageBackend, Table, WriteOp};
