//! Statements and the objects they are made of.

use super::{Actor, Agent, Group, Iri, StatementId};
use crate::primitives::VOID_VERB_IRI;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Language tag -> text.
pub type LanguageMap = BTreeMap<String, String>;

/// What the actor did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verb {
    pub id: Iri,
    pub display: LanguageMap,
}

impl Verb {
    /// Create a verb without display text.
    #[must_use]
    pub fn new(id: Iri) -> Self {
        Self {
            id,
            display: LanguageMap::new(),
        }
    }

    /// The reserved voiding verb.
    #[must_use]
    pub fn voided() -> Self {
        let mut display = LanguageMap::new();
        display.insert("en-US".to_string(), "voided".to_string());
        Self {
            id: Iri(VOID_VERB_IRI.to_string()),
            display,
        }
    }

    /// True for the reserved voiding verb.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.id.as_str() == VOID_VERB_IRI
    }
}

/// Optional metadata describing an activity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub name: LanguageMap,
    pub description: LanguageMap,
    pub activity_type: Option<Iri>,
    pub more_info: Option<String>,
}

impl ActivityDefinition {
    /// True when no field carries information.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.description.is_empty()
            && self.activity_type.is_none()
            && self.more_info.is_none()
    }
}

/// Something an actor interacts with. Identified by its IRI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Iri,
    pub definition: Option<ActivityDefinition>,
}

impl Activity {
    /// Create an activity without a definition.
    #[must_use]
    pub fn new(id: Iri) -> Self {
        Self {
            id,
            definition: None,
        }
    }

    /// Identity comparison: same IRI, definitions ignored.
    #[must_use]
    pub fn is_same(&self, other: &Activity) -> bool {
        self.id == other.id
    }
}

/// The target of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementObject {
    Activity(Activity),
    Agent(Agent),
    Group(Group),
    /// A reference to another statement, used by voiding statements.
    StatementRef(StatementId),
}

impl StatementObject {
    /// The referenced statement id, for `StatementRef` objects.
    #[must_use]
    pub fn statement_ref(&self) -> Option<StatementId> {
        match self {
            Self::StatementRef(id) => Some(*id),
            _ => None,
        }
    }

    /// The activity, for `Activity` objects.
    #[must_use]
    pub fn activity(&self) -> Option<&Activity> {
        match self {
            Self::Activity(a) => Some(a),
            _ => None,
        }
    }
}

/// Activities related to a statement through its context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextActivities {
    pub parent: Vec<Activity>,
    pub grouping: Vec<Activity>,
    pub category: Vec<Activity>,
    pub other: Vec<Activity>,
}

impl ContextActivities {
    /// All context activities, in parent/grouping/category/other order.
    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.parent
            .iter()
            .chain(&self.grouping)
            .chain(&self.category)
            .chain(&self.other)
    }
}

/// Circumstances of a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Context {
    pub registration: Option<Uuid>,
    pub instructor: Option<Actor>,
    pub context_activities: ContextActivities,
}

/// An immutable record of an actor performing a verb on an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Assigned by the store when absent.
    pub id: Option<StatementId>,
    pub actor: Actor,
    pub verb: Verb,
    pub object: StatementObject,
    pub context: Option<Context>,
    pub timestamp: Option<DateTime<Utc>>,
    pub authority: Option<Actor>,
}

impl Statement {
    /// Create a statement without id, context, timestamp or authority.
    #[must_use]
    pub fn new(actor: impl Into<Actor>, verb: Verb, object: StatementObject) -> Self {
        Self {
            id: None,
            actor: actor.into(),
            verb,
            object,
            context: None,
            timestamp: None,
            authority: None,
        }
    }

    /// Build a statement voiding `target`.
    #[must_use]
    pub fn voiding(actor: impl Into<Actor>, target: StatementId) -> Self {
        Self::new(actor, Verb::voided(), StatementObject::StatementRef(target))
    }

    /// Return a copy with the given id (or none). Never mutates `self`.
    #[must_use]
    pub fn with_id(&self, id: Option<StatementId>) -> Self {
        Self { id, ..self.clone() }
    }

    /// Return a copy with the given timestamp.
    #[must_use]
    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    /// Return a copy with the given authority.
    #[must_use]
    pub fn with_authority(self, authority: impl Into<Actor>) -> Self {
        Self {
            authority: Some(authority.into()),
            ..self
        }
    }

    /// Return a copy with the given context.
    #[must_use]
    pub fn with_context(self, context: Context) -> Self {
        Self {
            context: Some(context),
            ..self
        }
    }

    /// True if the verb is the reserved voiding verb.
    #[must_use]
    pub fn is_voiding(&self) -> bool {
        self.verb.is_void()
    }

    /// The statement this one voids, if it is a voiding statement.
    #[must_use]
    pub fn voided_target(&self) -> Option<StatementId> {
        if self.is_voiding() {
            self.object.statement_ref()
        } else {
            None
        }
    }

    /// Registration from the context, if any.
    #[must_use]
    pub fn registration(&self) -> Option<Uuid> {
        self.context.as_ref().and_then(|c| c.registration)
    }

    /// Every activity the statement references: the object first, then
    /// context activities.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.object.activity().into_iter().chain(
            self.context
                .iter()
                .flat_map(|c| c.context_activities.iter()),
        )
    }

    /// Every agent the statement names (actor, object, authority, instructor,
    /// group members included).
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        let object_agents: Box<dyn Iterator<Item = &Agent> + '_> = match &self.object {
            StatementObject::Agent(a) => Box::new(std::iter::once(a)),
            StatementObject::Group(g) => Box::new(g.members.iter()),
            _ => Box::new(std::iter::empty()),
        };
        self.actor
            .agents()
            .chain(object_agents)
            .chain(self.authority.iter().flat_map(Actor::agents))
            .chain(
                self.context
                    .iter()
                    .filter_map(|c| c.instructor.as_ref())
                    .flat_map(Actor::agents),
            )
    }
}
