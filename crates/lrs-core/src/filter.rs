//! # Filter Module
//!
//! Structured filters over statements and state documents.
//!
//! A filter is a conjunction of optional predicates. Every predicate that is
//! set must match; an unset predicate matches everything. Evaluation is pure,
//! so predicate order never changes the result.
//!
//! Time windows are inclusive at `since` and exclusive at `until`.

use crate::{Agent, Iri, LrsError, Statement, StatementObject, StateDocument, StateKey};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A predicate over one kind of record.
pub trait RecordFilter<T> {
    /// True if `record` satisfies every predicate set on the filter.
    fn matches(&self, record: &T) -> bool;
}

/// Evaluate `filter` against `record`.
pub fn matches<T, F: RecordFilter<T>>(record: &T, filter: &F) -> bool {
    filter.matches(record)
}

// =============================================================================
// STATEMENTS
// =============================================================================

/// Filter for statement listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementsFilter {
    /// Actor (or object) identity to match.
    pub agent: Option<Agent>,
    /// Verb IRI to match.
    pub verb: Option<Iri>,
    /// Object activity IRI to match.
    pub activity: Option<Iri>,
    /// Context registration to match.
    pub registration: Option<Uuid>,
    /// Earliest timestamp, inclusive.
    pub since: Option<DateTime<Utc>>,
    /// Latest timestamp, exclusive.
    pub until: Option<DateTime<Utc>>,
    /// Let `activity` also match context activities.
    pub related_activities: bool,
    /// Let `agent` also match authority, instructor and group members.
    pub related_agents: bool,
    /// Maximum number of results. `Some(0)` means no limit.
    pub limit: Option<usize>,
    /// Newest first instead of insertion order.
    pub descending: bool,
}

impl StatementsFilter {
    /// Create a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to statements involving `agent`.
    #[must_use]
    pub fn by_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Restrict to statements with the verb `verb`.
    #[must_use]
    pub fn by_verb(mut self, verb: Iri) -> Self {
        self.verb = Some(verb);
        self
    }

    /// Restrict to statements about the activity `activity`.
    #[must_use]
    pub fn by_activity(mut self, activity: Iri) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Restrict to statements in the registration `registration`.
    #[must_use]
    pub fn by_registration(mut self, registration: Uuid) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Only statements timestamped at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Only statements timestamped before `until`.
    #[must_use]
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Widen the activity predicate to context activities.
    #[must_use]
    pub fn include_related_activities(mut self) -> Self {
        self.related_activities = true;
        self
    }

    /// Widen the agent predicate to every agent the statement names.
    #[must_use]
    pub fn include_related_agents(mut self) -> Self {
        self.related_agents = true;
        self
    }

    /// Return at most `limit` statements.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return newest statements first.
    #[must_use]
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Apply ordering and limit to an insertion-ordered result set.
    #[must_use]
    pub fn window<T>(&self, mut records: Vec<T>) -> Vec<T> {
        if self.descending {
            records.reverse();
        }
        if let Some(limit) = self.limit.filter(|&l| l > 0) {
            records.truncate(limit);
        }
        records
    }

    fn matches_agent(&self, statement: &Statement, agent: &Agent) -> bool {
        if statement.actor.identifies(agent) {
            return true;
        }
        let object_match = match &statement.object {
            StatementObject::Agent(a) => a.is_same(agent),
            StatementObject::Group(g) => g.ifi.as_ref() == Some(&agent.ifi),
            _ => false,
        };
        if object_match {
            return true;
        }
        if !self.related_agents {
            return false;
        }
        let authority_match = statement
            .authority
            .as_ref()
            .is_some_and(|a| a.identifies(agent));
        let instructor_match = statement
            .context
            .as_ref()
            .and_then(|c| c.instructor.as_ref())
            .is_some_and(|i| i.identifies(agent));
        authority_match || instructor_match || statement.agents().any(|a| a.is_same(agent))
    }

    fn matches_activity(&self, statement: &Statement, activity: &Iri) -> bool {
        if self.related_activities {
            statement.activities().any(|a| &a.id == activity)
        } else {
            statement.object.activity().is_some_and(|a| &a.id == activity)
        }
    }
}

impl RecordFilter<Statement> for StatementsFilter {
    fn matches(&self, statement: &Statement) -> bool {
        if let Some(agent) = &self.agent {
            if !self.matches_agent(statement, agent) {
                return false;
            }
        }
        if let Some(verb) = &self.verb {
            if &statement.verb.id != verb {
                return false;
            }
        }
        if let Some(activity) = &self.activity {
            if !self.matches_activity(statement, activity) {
                return false;
            }
        }
        if let Some(registration) = self.registration {
            if statement.registration() != Some(registration) {
                return false;
            }
        }
        within_window(statement.timestamp, self.since, self.until)
    }
}

// =============================================================================
// STATE DOCUMENTS
// =============================================================================

/// Filter for state and state-document lookups.
///
/// `registration: None` matches every registration, including records
/// stored without one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDocumentsFilter {
    pub activity: Option<Iri>,
    pub agent: Option<Agent>,
    pub registration: Option<Uuid>,
    /// Earliest update time, inclusive.
    pub since: Option<DateTime<Utc>>,
}

impl StateDocumentsFilter {
    /// Create a filter that matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter selecting every record sharing the (activity, agent,
    /// registration) part of `key`. The state id is ignored.
    #[must_use]
    pub fn for_key(key: &StateKey) -> Self {
        Self {
            activity: Some(key.activity.clone()),
            agent: Some(key.agent.clone()),
            registration: key.registration,
            since: None,
        }
    }

    /// Restrict to the activity `activity`.
    #[must_use]
    pub fn by_activity(mut self, activity: Iri) -> Self {
        self.activity = Some(activity);
        self
    }

    /// Restrict to the agent `agent`.
    #[must_use]
    pub fn by_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Restrict to the registration `registration`.
    #[must_use]
    pub fn by_registration(mut self, registration: Uuid) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Only documents updated at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Fail with `InvalidFilter` unless both activity and agent are set.
    pub fn require_scope(&self) -> Result<(&Iri, &Agent), LrsError> {
        match (&self.activity, &self.agent) {
            (Some(activity), Some(agent)) => Ok((activity, agent)),
            (None, _) => Err(LrsError::InvalidFilter(
                "state document lookups require an activity".to_string(),
            )),
            (_, None) => Err(LrsError::InvalidFilter(
                "state document lookups require an agent".to_string(),
            )),
        }
    }
}

impl RecordFilter<StateKey> for StateDocumentsFilter {
    fn matches(&self, key: &StateKey) -> bool {
        if let Some(activity) = &self.activity {
            if &key.activity != activity {
                return false;
            }
        }
        if let Some(agent) = &self.agent {
            if !key.agent.is_same(agent) {
                return false;
            }
        }
        if let Some(registration) = self.registration {
            if key.registration != Some(registration) {
                return false;
            }
        }
        true
    }
}

impl RecordFilter<StateDocument> for StateDocumentsFilter {
    fn matches(&self, document: &StateDocument) -> bool {
        RecordFilter::<StateKey>::matches(self, &document.key)
            && within_window(Some(document.updated), self.since, None)
    }
}

fn within_window(
    at: Option<DateTime<Utc>>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> bool {
    if since.is_none() && until.is_none() {
        return true;
    }
    let Some(at) = at else {
        return false;
    };
    since.is_none_or(|s| at >= s) && until.is_none_or(|u| at < u)
}

// =============================================================================
// TESTS
// =============================================================================
