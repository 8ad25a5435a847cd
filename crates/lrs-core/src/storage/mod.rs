//! # Storage Backends
//!
//! The byte-level key-value abstraction every repository runs on.
//!
//! A backend exposes point lookup, ordered prefix scan and an atomic batch
//! write over a fixed set of keyspaces (`Table`). It never interprets the
//! bytes it stores; encoding lives in `formats`.
//!
//! Two implementations ship with the crate:
//! - `MemoryBackend`: `BTreeMap` per table (fast, volatile)
//! - `RedbBackend`: one redb table per keyspace (ACID, persistent)
//!
//! `StorageBackend` selects one of them at runtime.

mod memory;
mod redb_store;

pub use memory::MemoryBackend;
pub use redb_store::RedbBackend;

use crate::LrsError;
use std::path::Path;

// =============================================================================
// KEYSPACES
// =============================================================================

/// The keyspaces a repository stores records in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Insertion sequence (u64 big-endian) -> statement record.
    Statements,
    /// Statement id (16 bytes) -> insertion sequence.
    StatementIndex,
    /// Voided statement id -> id of the statement voiding it.
    Voids,
    /// State storage key -> state record.
    States,
    /// State storage key -> state document record.
    StateDocuments,
    /// Activity IRI -> activity record.
    Activities,
    /// Agent IFI key -> person record.
    Agents,
    /// Name -> counter value.
    Metadata,
}

impl Table {
    /// Every keyspace, in declaration order.
    pub const ALL: [Table; 8] = [
        Table::Statements,
        Table::StatementIndex,
        Table::Voids,
        Table::States,
        Table::StateDocuments,
        Table::Activities,
        Table::Agents,
        Table::Metadata,
    ];

    /// Stable table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Table::Statements => "statements",
            Table::StatementIndex => "statement_index",
            Table::Voids => "voids",
            Table::States => "states",
            Table::StateDocuments => "state_documents",
            Table::Activities => "activities",
            Table::Agents => "agents",
            Table::Metadata => "metadata",
        }
    }
}

// =============================================================================
// WRITE OPERATIONS
// =============================================================================

/// A single mutation inside a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or replace `key` with `value`.
    Put {
        table: Table,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// Remove `key`. Removing an absent key is a no-op.
    Delete { table: Table, key: Vec<u8> },
}

impl WriteOp {
    /// Build a put.
    #[must_use]
    pub fn put(table: Table, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            table,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a delete.
    #[must_use]
    pub fn delete(table: Table, key: impl Into<Vec<u8>>) -> Self {
        Self::Delete {
            table,
            key: key.into(),
        }
    }

    /// The keyspace this operation targets.
    #[must_use]
    pub fn table(&self) -> Table {
        match self {
            Self::Put { table, .. } | Self::Delete { table, .. } => *table,
        }
    }

    /// The key this operation targets.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        match self {
            Self::Put { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

// =============================================================================
// BACKEND TRAIT
// =============================================================================

/// A byte-oriented key-value store with atomic batches.
///
/// All operations return `Result<T, LrsError>`; backend failures surface as
/// `LrsError::IoError` and are re-classified by the repository.
pub trait Backend {
    /// Point lookup.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LrsError>;

    /// Every entry whose key starts with `prefix`, in ascending key order.
    /// An empty prefix scans the whole table.
    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LrsError>;

    /// Apply `ops` in order as one unit: either all become visible or none.
    fn apply(&mut self, ops: &[WriteOp]) -> Result<(), LrsError>;

    /// Insert or replace a single key.
    fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), LrsError> {
        self.apply(&[WriteOp::put(table, key, value)])
    }

    /// Remove a single key. Removing an absent key is a no-op.
    fn delete(&mut self, table: Table, key: &[u8]) -> Result<(), LrsError> {
        self.apply(&[WriteOp::delete(table, key)])
    }

    /// Number of entries in a table.
    fn count(&self, table: Table) -> Result<usize, LrsError> {
        Ok(self.scan(table, &[])?.len())
    }
}

// =============================================================================
// RUNTIME SELECTION
// =============================================================================

/// Storage backend selected at runtime.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory maps (fast, volatile).
    InMemory(MemoryBackend),
    /// Disk-backed tables using redb (ACID, persistent).
    Persistent(RedbBackend),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryBackend::new())
    }
}

impl StorageBackend {
    /// Open (or create) a persistent backend at `path`.
    pub fn open_redb(path: impl AsRef<Path>) -> Result<Self, LrsError> {
        Ok(Self::Persistent(RedbBackend::open(path)?))
    }

    /// True for the persistent variant.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Persistent(_))
    }
}

impl Backend for StorageBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LrsError> {
        match self {
            Self::InMemory(b) => b.get(table, key),
            Self::Persistent(b) => b.get(table, key),
        }
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LrsError> {
        match self {
            Self::InMemory(b) => b.scan(table, prefix),
            Self::Persistent(b) => b.scan(table, prefix),
        }
    }

    fn apply(&mut self, ops: &[WriteOp]) -> Result<(), LrsError> {
        match self {
            Self::InMemory(b) => b.apply(ops),
            Self::Persistent(b) => b.apply(ops),
        }
    }

    fn count(&self, table: Table) -> Result<usize, LrsError> {
        match self {
            Self::InMemory(b) => b.count(table),
            Self::Persistent(b) => b.count(table),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<_> = Table::ALL.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Table::ALL.len());
    }

    #[test]
    fn dispatch_reaches_both_variants() {
        let temp = tempdir().expect("temp dir");
        let backends = [
            StorageBackend::default(),
            StorageBackend::open_redb(temp.path().join("test.redb")).expect("open db"),
        ];
        for mut backend in backends {
            backend.put(Table::Metadata, b"k", b"v").expect("put");
            assert_eq!(
                backend.get(Table::Metadata, b"k").expect("get"),
                Some(b"v".to_vec())
            );
            assert_eq!(backend.count(Table::Metadata).expect("count"), 1);
            backend.delete(Table::Metadata, b"k").expect("delete");
            assert_eq!(backend.get(Table::Metadata, b"k").expect("get"), None);
        }
    }
}
