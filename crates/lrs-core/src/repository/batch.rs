//! Staging area for one backend write transaction.
//!
//! `WriteBatch` collects the puts and deletes produced by a flush together
//! with the derived rows (void index, activities, agents) those writes
//! imply. Read-modify-write rows are merged in an overlay first, so two
//! statements in the same batch naming the same activity produce one row.
//!
//! Nothing reaches the backend until `Repository::apply_writes` hands the
//! finished op list over in a single `Backend::apply` call.

use crate::formats::{decode_record, encode_record};
use crate::storage::{Backend, Table, WriteOp};
use crate::{Activity, Agent, Iri, LrsError, Person, StatementId};
use std::collections::BTreeMap;

/// Buffered writes plus the overlay state they were staged against.
#[derive(Debug)]
pub(crate) struct WriteBatch {
    ops: Vec<WriteOp>,
    next_seq: u64,
    seq_allocated: bool,
    voids: BTreeMap<StatementId, StatementId>,
    /// Statements staged in this batch: id -> is a voiding statement.
    statements: BTreeMap<StatementId, bool>,
    activities: BTreeMap<Iri, Activity>,
    people: BTreeMap<String, Person>,
    /// Sequence numbers of keys staged in this batch; `None` once removed.
    records: BTreeMap<(Table, Vec<u8>), Option<u64>>,
}

impl WriteBatch {
    /// Start a batch whose first allocated sequence is `next_seq`.
    pub(crate) fn new(next_seq: u64) -> Self {
        Self {
            ops: Vec::new(),
            next_seq,
            seq_allocated: false,
            voids: BTreeMap::new(),
            statements: BTreeMap::new(),
            activities: BTreeMap::new(),
            people: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    /// Reserve the next insertion sequence number.
    pub(crate) fn allocate_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.seq_allocated = true;
        seq
    }

    /// Sequence number the repository continues from after this batch.
    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Buffer a put.
    pub(crate) fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put { table, key, value });
    }

    /// Buffer a delete.
    pub(crate) fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.records.insert((table, key.clone()), None);
        self.ops.push(WriteOp::Delete { table, key });
    }

    /// Sequence number to store a keyed record under.
    ///
    /// An existing record keeps its sequence; a new (or re-created) one
    /// gets a fresh number.
    pub(crate) fn record_seq<B: Backend>(
        &mut self,
        backend: &B,
        table: Table,
        key: &[u8],
        existing: impl FnOnce(&[u8]) -> Result<u64, LrsError>,
    ) -> Result<u64, LrsError> {
        let staged = self.records.get(&(table, key.to_vec())).copied();
        let seq = match staged {
            Some(Some(seq)) => seq,
            Some(None) => self.allocate_seq(),
            None => match backend.get(table, key)? {
                Some(bytes) => existing(&bytes)?,
                None => self.allocate_seq(),
            },
        };
        self.records.insert((table, key.to_vec()), Some(seq));
        Ok(seq)
    }

    /// Voids staged in this batch.
    pub(crate) fn voids(&self) -> &BTreeMap<StatementId, StatementId> {
        &self.voids
    }

    /// Note that statement `id` is staged in this batch.
    pub(crate) fn stage_statement_id(&mut self, id: StatementId, voiding: bool) {
        self.statements.insert(id, voiding);
    }

    /// Whether statement `id` staged in this batch is a voiding statement;
    /// `None` if it was not staged here.
    pub(crate) fn staged_is_voiding(&self, id: StatementId) -> Option<bool> {
        self.statements.get(&id).copied()
    }

    /// Record that `voider` voids `target`.
    pub(crate) fn stage_void(&mut self, target: StatementId, voider: StatementId) {
        self.voids.insert(target, voider);
        self.put(
            Table::Voids,
            target.as_bytes().to_vec(),
            voider.as_bytes().to_vec(),
        );
    }

    /// Merge a referenced activity into the activities overlay.
    ///
    /// The latest non-empty definition wins; an empty one never erases a
    /// known definition.
    pub(crate) fn stage_activity<B: Backend>(
        &mut self,
        backend: &B,
        activity: &Activity,
    ) -> Result<(), LrsError> {
        let current = match self.activities.get(&activity.id) {
            Some(known) => Some(known.clone()),
            None => backend
                .get(Table::Activities, activity.id.as_str().as_bytes())?
                .map(|bytes| decode_record::<Activity>(&bytes))
                .transpose()?,
        };
        let merged = match current {
            Some(mut known) => {
                if activity.definition.as_ref().is_some_and(|d| !d.is_empty()) {
                    known.definition.clone_from(&activity.definition);
                }
                known
            }
            None => activity.clone(),
        };
        self.activities.insert(activity.id.clone(), merged);
        Ok(())
    }

    /// Merge an agent's name and identifier into the people overlay.
    pub(crate) fn stage_agent<B: Backend>(
        &mut self,
        backend: &B,
        agent: &Agent,
    ) -> Result<(), LrsError> {
        let key = agent.ifi.key();
        let mut person = match self.people.remove(&key) {
            Some(person) => person,
            None => backend
                .get(Table::Agents, key.as_bytes())?
                .map(|bytes| decode_record::<Person>(&bytes))
                .transpose()?
                .unwrap_or_default(),
        };
        person.absorb(agent);
        self.people.insert(key, person);
        Ok(())
    }

    /// Flush the overlays into ops and return the finished op list.
    ///
    /// The sequence counter is persisted whenever this batch allocated from
    /// it.
    pub(crate) fn finish(mut self) -> Result<Vec<WriteOp>, LrsError> {
        for (iri, activity) in std::mem::take(&mut self.activities) {
            let value = encode_record(&activity)?;
            self.put(Table::Activities, iri.as_str().as_bytes().to_vec(), value);
        }
        for (key, person) in std::mem::take(&mut self.people) {
            let value = encode_record(&person)?;
            self.put(Table::Agents, key.into_bytes(), value);
        }
        if self.seq_allocated {
            let next = self.next_seq;
            self.put(
                Table::Metadata,
                super::NEXT_SEQ_KEY.to_vec(),
                next.to_be_bytes().to_vec(),
            );
        }
        Ok(self.ops)
    }
}
