//! In-memory backend.
//!
//! All data structures use `BTreeMap` for deterministic ordering, so scans
//! return keys in the same order as the persistent backend.

use super::{Backend, Table, WriteOp};
use crate::LrsError;
use std::collections::BTreeMap;

/// Volatile key-value backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    tables: BTreeMap<Table, BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LrsError> {
        Ok(self
            .tables
            .get(&table)
            .and_then(|t| t.get(key))
            .cloned())
    }

    fn scan(&self, table: Table, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LrsError> {
        let Some(entries) = self.tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&mut self, ops: &[WriteOp]) -> Result<(), LrsError> {
        for op in ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    self.tables
                        .entry(*table)
                        .or_default()
                        .insert(key.clone(), value.clone());
                }
                WriteOp::Delete { table, key } => {
                    if let Some(entries) = self.tables.get_mut(table) {
                        entries.remove(key);
                    }
                }
            }
        }
        Ok(())
    }

    fn count(&self, table: Table) -> Result<usize, LrsError> {
        Ok(self.tables.get(&table).map_or(0, BTreeMap::len))
    }
}
