//! Activities referenced by stored statements.

use super::Repository;
use crate::formats::decode_record;
use crate::storage::{Backend, Table};
use crate::{Activity, Iri, LrsError};

/// Activity lookup contract.
pub trait ActivityRepository {
    /// Find an activity by IRI.
    ///
    /// Fails with `NotFound` unless a stored statement referenced it as
    /// object or context activity. The latest non-empty definition is
    /// returned.
    fn find_activity_by_id(&self, id: &Iri) -> Result<Activity, LrsError>;
}

impl<B: Backend> ActivityRepository for Repository<B> {
    fn find_activity_by_id(&self, id: &Iri) -> Result<Activity, LrsError> {
        match self.backend.get(Table::Activities, id.as_str().as_bytes())? {
            Some(bytes) => decode_record(&bytes),
            None => Err(LrsError::NotFound(format!("activity {}", id))),
        }
    }
}
