//! Persons: every identity recorded for an agent.

use super::Repository;
use crate::formats::decode_record;
use crate::storage::{Backend, Table};
use crate::{Agent, LrsError, Person};

/// Person lookup contract.
pub trait PersonRepository {
    /// The person behind `agent`: every name and identifier recorded under
    /// the agent's IFI. An unknown agent yields a person built from the
    /// agent alone.
    fn find_related_person_to(&self, agent: &Agent) -> Result<Person, LrsError>;
}

impl<B: Backend> PersonRepository for Repository<B> {
    fn find_related_person_to(&self, agent: &Agent) -> Result<Person, LrsError> {
        match self.backend.get(Table::Agents, agent.ifi.key().as_bytes())? {
            Some(bytes) => decode_record(&bytes),
            None => Ok(Person::from_agents([agent])),
        }
    }
}
