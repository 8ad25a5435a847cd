//! # redb-backed Storage
//!
//! A disk-backed key-value store using the redb embedded database.
//!
//! redb provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Each `Table` maps to one redb table of raw byte keys and values. A call
//! to `apply` is exactly one write transaction, so a batch is either fully
//! committed or not visible at all.

use super::{Backend, Table, WriteOp};
use crate::LrsError;
use redb::{Database, ReadableDatabase, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};

/// Table for statements: sequence (u64 BE) -> statement record
const STATEMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("statements");

/// Table for the statement id index: id (16 bytes) -> sequence
const STATEMENT_INDEX: TableDefinition<&[u8], &[u8]> = TableDefinition::new("statement_index");

/// Table for voids: voided id -> voiding id
const VOIDS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("voids");

/// Table for states: storage key -> state record
const STATES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("states");

/// Table for state documents: storage key -> document record
const STATE_DOCUMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("state_documents");

/// Table for activities: IRI -> activity record
const ACTIVITIES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("activities");

/// Table for agents: IFI key -> person record
const AGENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("agents");

/// Table for metadata: name -> value
const METADATA: TableDefinition<&[u8], &[u8]> = TableDefinition::new("metadata");

fn definition(table: Table) -> TableDefinition<'static, &'static [u8], &'static [u8]> {
    match table {
        Table::Statements => STATEMENTS,
        Table::StatementIndex => STATEMENT_INDEX,
        Table::Voids => VOIDS,
        Table::States => STATES,
        Table::StateDocuments => STATE_DOCUMENTS,
        Table::Activities => ACTIVITIES,
        Table::Agents => AGENTS,
        Table::Metadata => METADATA,
    }
}

fn io_error(e: impl std::fmt::Display) -> LrsError {
    LrsError::IoError(e.to_string())
}

/// A disk-backed store using redb.
pub struct RedbBackend {
    /// The redb database handle.
    db: Database,
    /// Location of the database file.
    path: PathBuf,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RedbBackend {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LrsError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(io_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_error)?;
            for table in Table::ALL {
                let _ = write_txn.open_table(definition(table)).map_err(io_error)?;
            }
            write_txn.commit().map_err(io_error)?;
        }

        tracing::debug!(path = %path.display(), "opened redb backend");
        Ok(Self { db, path })
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), LrsError> {
        self.db.compact().map_err(io_error)?;
        Ok(())
    }
}

impl Backend for RedbBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LrsError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let t = read_txn.open_table(definition(table)).map_err(io_error)?;
        let value = t.get(key).map_err(io_error)?.map(|v| v.value().to_vec());
        Ok(value)
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LrsError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let t = read_txn.open_table(definition(table)).map_err(io_error)?;

        let mut entries = Vec::new();
        for entry in t.range::<&[u8]>(prefix..).map_err(io_error)? {
            let (key, value) = entry.map_err(io_error)?;
            let key = key.value();
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.value().to_vec()));
        }
        Ok(entries)
    }

    fn apply(&mut self, ops: &[WriteOp]) -> Result<(), LrsError> {
        if ops.is_empty() {
            return Ok(());
        }

        let write_txn = self.db.begin_write().map_err(io_error)?;
        for op in ops {
            let mut t = write_txn
                .open_table(definition(op.table()))
                .map_err(io_error)?;
            match op {
                WriteOp::Put { key, value, .. } => {
                    t.insert(key.as_slice(), value.as_slice())
                        .map_err(io_error)?;
                }
                WriteOp::Delete { key, .. } => {
                    t.remove(key.as_slice()).map_err(io_error)?;
                }
            }
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }

    fn count(&self, table: Table) -> Result<usize, LrsError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let t = read_txn.open_table(definition(table)).map_err(io_error)?;
        Ok(t.len().map_err(io_error)? as usize)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn basic_operations() {
        let temp = tempdir().expect("temp dir");
        let mut backend = RedbBackend::open(temp.path().join("test.redb")).expect("open db");

        backend.put(Table::States, b"k1", b"v1").expect("put");
        assert_eq!(
            backend.get(Table::States, b"k1").expect("get"),
            Some(b"v1".to_vec())
        );
        assert_eq!(backend.get(Table::States, b"k2").expect("get"), None);
        assert_eq!(backend.count(Table::States).expect("count"), 1);
    }

    #[test]
    fn persistence() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        // Create and populate
        {
            let mut backend = RedbBackend::open(&db_path).expect("open db");
            backend
                .apply(&[
                    WriteOp::put(Table::Statements, 1u64.to_be_bytes(), b"a".to_vec()),
                    WriteOp::put(Table::Statements, 2u64.to_be_bytes(), b"b".to_vec()),
                ])
                .expect("apply");
        }

        // Reopen and verify
        {
            let backend = RedbBackend::open(&db_path).expect("reopen db");
            let values: Vec<_> = backend
                .scan(Table::Statements, &[])
                .expect("scan")
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec()]);
        }
    }

    #[test]
    fn prefix_scan_stops_at_prefix_end() {
        let temp = tempdir().expect("temp dir");
        let mut backend = RedbBackend::open(temp.path().join("test.redb")).expect("open db");
        backend
            .apply(&[
                WriteOp::put(Table::States, b"a1".to_vec(), b"1".to_vec()),
                WriteOp::put(Table::States, b"b1".to_vec(), b"2".to_vec()),
                WriteOp::put(Table::States, b"b2".to_vec(), b"3".to_vec()),
                WriteOp::put(Table::States, b"c1".to_vec(), b"4".to_vec()),
            ])
            .expect("apply");

        let keys: Vec<_> = backend
            .scan(Table::States, b"b")
            .expect("scan")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"b1".to_vec(), b"b2".to_vec()]);
    }

    #[test]
    fn transaction_multiple_operations_atomic() {
        let temp = tempdir().expect("temp dir");
        let mut backend = RedbBackend::open(temp.path().join("test.redb")).expect("open db");

        backend
            .apply(&[
                WriteOp::put(Table::Voids, b"target".to_vec(), b"voider".to_vec()),
                WriteOp::put(Table::Metadata, b"next_seq".to_vec(), 7u64.to_be_bytes()),
                WriteOp::delete(Table::States, b"absent".to_vec()),
            ])
            .expect("apply");

        assert!(backend.get(Table::Voids, b"target").expect("get").is_some());
        assert_eq!(
            backend.get(Table::Metadata, b"next_seq").expect("get"),
            Some(7u64.to_be_bytes().to_vec())
        );
    }

    #[test]
    fn delete_removes_key() {
        let temp = tempdir().expect("temp dir");
        let mut backend = RedbBackend::open(temp.path().join("test.redb")).expect("open db");
        backend.put(Table::Agents, b"k", b"v").expect("put");
        backend.delete(Table::Agents, b"k").expect("delete");
        backend.delete(Table::Agents, b"k").expect("delete again");
        assert_eq!(backend.count(Table::Agents).expect("count"), 0);
    }

    #[test]
    fn recovery_compact_and_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        {
            let mut backend = RedbBackend::open(&db_path).expect("open db");
            for i in 0u64..50 {
                backend
                    .put(Table::Statements, &i.to_be_bytes(), b"payload")
                    .expect("put");
            }
            backend.compact().expect("compact");
        }
        let backend = RedbBackend::open(&db_path).expect("reopen db");
        assert_eq!(backend.count(Table::Statements).expect("count"), 50);
        assert_eq!(backend.path(), db_path.as_path());
    }
}
