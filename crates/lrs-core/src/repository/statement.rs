//! # Statement Store
//!
//! Append-only storage of immutable statements.
//!
//! Statements are keyed by insertion sequence, so a full scan returns them
//! in storage order. A secondary index maps each id to its sequence.
//!
//! ## Voiding
//!
//! Storing a statement with the void verb records `target -> voider` in the
//! void index. From then on the target is reachable only through
//! `find_voided_statement_by_id`. The voiding statement itself lives in the
//! voided view from the moment it is stored. A voiding statement can never
//! be voided.

use super::batch::WriteBatch;
use super::{PendingWrite, Repository, id_from_bytes, seq_from_bytes};
use crate::filter::{RecordFilter, StatementsFilter};
use crate::formats::{decode_record, encode_record};
use crate::identity::new_statement_id;
use crate::storage::{Backend, Table};
use crate::{Actor, LrsError, Statement, StatementId};

/// Statement storage contract.
pub trait StatementRepository {
    /// Find a statement that is neither voided nor voiding.
    ///
    /// Fails with `NotFound` if the id is unknown, the statement is in the
    /// voided view, or `authority` is given and differs from the stored
    /// authority.
    fn find_statement_by_id(
        &self,
        id: StatementId,
        authority: Option<&Actor>,
    ) -> Result<Statement, LrsError>;

    /// Find a voided or voiding statement.
    ///
    /// Fails with `NotFound` unless the statement exists, is in the voided
    /// view and (when given) matches `authority`.
    fn find_voided_statement_by_id(
        &self,
        id: StatementId,
        authority: Option<&Actor>,
    ) -> Result<Statement, LrsError>;

    /// Every statement outside the voided view matching `filter`, in insertion order
    /// unless the filter asks for descending order.
    fn find_statements_by(
        &self,
        filter: &StatementsFilter,
        authority: Option<&Actor>,
    ) -> Result<Vec<Statement>, LrsError>;

    /// Store a statement and return its id.
    ///
    /// A missing id is generated; an existing one is kept. The caller's
    /// value is never modified. Re-storing an id is accepted only when the
    /// content is identical.
    fn store_statement(&mut self, statement: &Statement, flush: bool)
    -> Result<StatementId, LrsError>;
}

impl<B: Backend> StatementRepository for Repository<B> {
    fn find_statement_by_id(
        &self,
        id: StatementId,
        authority: Option<&Actor>,
    ) -> Result<Statement, LrsError> {
        match self.load_statement(id)? {
            Some(s) if !self.is_voided(id, &s) && authority_matches(&s, authority) => Ok(s),
            _ => Err(LrsError::NotFound(format!("statement {}", id))),
        }
    }

    fn find_voided_statement_by_id(
        &self,
        id: StatementId,
        authority: Option<&Actor>,
    ) -> Result<Statement, LrsError> {
        match self.load_statement(id)? {
            Some(s) if self.is_voided(id, &s) && authority_matches(&s, authority) => Ok(s),
            _ => Err(LrsError::NotFound(format!("voided statement {}", id))),
        }
    }

    fn find_statements_by(
        &self,
        filter: &StatementsFilter,
        authority: Option<&Actor>,
    ) -> Result<Vec<Statement>, LrsError> {
        let mut found = Vec::new();
        for (_, bytes) in self.backend.scan(Table::Statements, &[])? {
            let statement: Statement = decode_record(&bytes)?;
            let voided = statement
                .id
                .is_some_and(|id| self.is_voided(id, &statement));
            if !voided && authority_matches(&statement, authority) && filter.matches(&statement) {
                found.push(statement);
            }
        }
        tracing::trace!(found = found.len(), "statement query");
        Ok(filter.window(found))
    }

    fn store_statement(
        &mut self,
        statement: &Statement,
        flush: bool,
    ) -> Result<StatementId, LrsError> {
        if statement.is_voiding() && statement.voided_target().is_none() {
            return Err(LrsError::InvalidStatement(
                "voiding statement must reference a statement".to_string(),
            ));
        }

        let id = statement.id.unwrap_or_else(new_statement_id);
        let record = statement.with_id(Some(id));

        let existing = match self.pending_statement(id) {
            Some(queued) => Some(queued.clone()),
            None => self.load_statement(id)?,
        };
        if let Some(existing) = existing {
            if existing != record {
                tracing::warn!(%id, "statement id already used by different content");
                return Err(LrsError::StatementConflict(id));
            }
            tracing::debug!(%id, "identical statement re-submitted");
            if flush {
                self.flush()?;
            }
            return Ok(id);
        }

        tracing::debug!(%id, voiding = record.is_voiding(), flush, "storing statement");
        self.enqueue(PendingWrite::Statement(record), flush)?;
        Ok(id)
    }
}

impl<B: Backend> Repository<B> {
    /// Stage a statement row, its index entry and the rows it derives.
    pub(super) fn stage_statement(
        &self,
        batch: &mut WriteBatch,
        statement: &Statement,
    ) -> Result<(), LrsError> {
        let Some(id) = statement.id else {
            return Err(LrsError::InvalidStatement(
                "queued statement without id".to_string(),
            ));
        };
        let seq = batch.allocate_seq();
        batch.put(
            Table::Statements,
            seq.to_be_bytes().to_vec(),
            encode_record(statement)?,
        );
        batch.put(
            Table::StatementIndex,
            id.as_bytes().to_vec(),
            seq.to_be_bytes().to_vec(),
        );

        if let Some(target) = statement.voided_target() {
            let known = self.voids.contains_key(&target) || batch.voids().contains_key(&target);
            let target_is_void = match batch.staged_is_voiding(target) {
                Some(voiding) => voiding,
                None => self
                    .load_statement(target)?
                    .is_some_and(|t| t.is_voiding()),
            };
            if !known && !target_is_void {
                batch.stage_void(target, id);
            }
        }
        batch.stage_statement_id(id, statement.is_voiding());

        for activity in statement.activities() {
            batch.stage_activity(&self.backend, activity)?;
        }
        for agent in statement.agents() {
            batch.stage_agent(&self.backend, agent)?;
        }
        Ok(())
    }

    /// Read a stored statement by id.
    fn load_statement(&self, id: StatementId) -> Result<Option<Statement>, LrsError> {
        let Some(raw) = self.backend.get(Table::StatementIndex, id.as_bytes())? else {
            return Ok(None);
        };
        let seq = seq_from_bytes(&raw)?;
        match self.backend.get(Table::Statements, &seq.to_be_bytes())? {
            Some(bytes) => decode_record(&bytes).map(Some),
            None => Err(LrsError::DeserializationError(format!(
                "statement index points at a missing record for {}",
                id
            ))),
        }
    }

    /// True if `statement` (stored under `id`) belongs to the voided view:
    /// it voids another statement or has been voided itself.
    fn is_voided(&self, id: StatementId, statement: &Statement) -> bool {
        statement.is_voiding() || self.voids.contains_key(&id)
    }

    /// Id of the statement voiding `id`, if any.
    pub fn voided_by(&self, id: StatementId) -> Option<StatementId> {
        self.voids.get(&id).copied()
    }

    /// Ids of every voided statement, with the statement voiding each one.
    pub fn void_index(&self) -> Result<Vec<(StatementId, StatementId)>, LrsError> {
        self.backend
            .scan(Table::Voids, &[])?
            .into_iter()
            .map(|(target, voider)| Ok((id_from_bytes(&target)?, id_from_bytes(&voider)?)))
            .collect()
    }
}

fn authority_matches(statement: &Statement, authority: Option<&Actor>) -> bool {
    authority.is_none_or(|wanted| {
        statement
            .authority
            .as_ref()
            .is_some_and(|stored| stored.is_same(wanted))
    })
}

// =============================================================================
// TESTS
// =============================================================================
