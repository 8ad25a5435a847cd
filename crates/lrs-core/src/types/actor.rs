//! Actors: agents, groups and the persons they belong to.
//!
//! Identity is carried by the inverse functional identifier (IFI). Two agents
//! with the same IFI are the same agent regardless of display name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An account on an external system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account {
    /// Canonical home page of the system the account lives on.
    pub home_page: String,
    /// Unique name of the account on that system.
    pub name: String,
}

impl Account {
    /// Create a new account.
    #[must_use]
    pub fn new(home_page: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            home_page: home_page.into(),
            name: name.into(),
        }
    }
}

/// The identifying property of an agent or identified group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InverseFunctionalIdentifier {
    /// A `mailto:` IRI.
    Mbox(String),
    /// Hex SHA-1 of a `mailto:` IRI.
    MboxSha1Sum(String),
    /// An OpenID URI.
    OpenId(String),
    /// An account on an external system.
    Account(Account),
}

impl InverseFunctionalIdentifier {
    /// Create an mbox identifier, adding the `mailto:` scheme when missing.
    #[must_use]
    pub fn mbox(address: impl Into<String>) -> Self {
        let address = address.into();
        if address.starts_with("mailto:") {
            Self::Mbox(address)
        } else {
            Self::Mbox(format!("mailto:{}", address))
        }
    }

    /// Stable textual key, used to index agents in storage.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Mbox(v) => format!("mbox|{}", v),
            Self::MboxSha1Sum(v) => format!("mbox_sha1sum|{}", v),
            Self::OpenId(v) => format!("openid|{}", v),
            Self::Account(a) => format!("account|{}|{}", a.home_page, a.name),
        }
    }
}

/// An individual agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Optional display name.
    pub name: Option<String>,
    /// The identifying property.
    pub ifi: InverseFunctionalIdentifier,
}

impl Agent {
    /// Create an anonymous-name agent.
    #[must_use]
    pub fn new(ifi: InverseFunctionalIdentifier) -> Self {
        Self { name: None, ifi }
    }

    /// Create an agent with a display name.
    #[must_use]
    pub fn named(name: impl Into<String>, ifi: InverseFunctionalIdentifier) -> Self {
        Self {
            name: Some(name.into()),
            ifi,
        }
    }

    /// Identity comparison: same IFI, names ignored.
    #[must_use]
    pub fn is_same(&self, other: &Agent) -> bool {
        self.ifi == other.ifi
    }
}

/// A group of agents, either identified (has an IFI) or anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Optional display name.
    pub name: Option<String>,
    /// Present for identified groups.
    pub ifi: Option<InverseFunctionalIdentifier>,
    /// Group members.
    pub members: Vec<Agent>,
}

impl Group {
    /// Identity comparison.
    ///
    /// Identified groups compare by IFI. Anonymous groups compare by the set
    /// of member identities.
    #[must_use]
    pub fn is_same(&self, other: &Group) -> bool {
        match (&self.ifi, &other.ifi) {
            (Some(a), Some(b)) => a == b,
            (None, None) => {
                let mine: BTreeSet<_> = self.members.iter().map(|m| &m.ifi).collect();
                let theirs: BTreeSet<_> = other.members.iter().map(|m| &m.ifi).collect();
                mine == theirs
            }
            _ => false,
        }
    }

    /// True if `agent` is listed among the members.
    #[must_use]
    pub fn has_member(&self, agent: &Agent) -> bool {
        self.members.iter().any(|m| m.is_same(agent))
    }
}

/// Whoever performs a statement or acts as its authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Agent(Agent),
    Group(Group),
}

impl Actor {
    /// The identifying property, if any (anonymous groups have none).
    #[must_use]
    pub fn ifi(&self) -> Option<&InverseFunctionalIdentifier> {
        match self {
            Self::Agent(a) => Some(&a.ifi),
            Self::Group(g) => g.ifi.as_ref(),
        }
    }

    /// Display name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Agent(a) => a.name.as_deref(),
            Self::Group(g) => g.name.as_deref(),
        }
    }

    /// Identity comparison between two actors of the same kind.
    #[must_use]
    pub fn is_same(&self, other: &Actor) -> bool {
        match (self, other) {
            (Self::Agent(a), Self::Agent(b)) => a.is_same(b),
            (Self::Group(a), Self::Group(b)) => a.is_same(b),
            _ => false,
        }
    }

    /// True if this actor is `agent`, or a group `agent` is identified as.
    #[must_use]
    pub fn identifies(&self, agent: &Agent) -> bool {
        self.ifi() == Some(&agent.ifi)
    }

    /// Every agent this actor names, the group itself excluded.
    pub fn agents(&self) -> Box<dyn Iterator<Item = &Agent> + '_> {
        match self {
            Self::Agent(a) => Box::new(std::iter::once(a)),
            Self::Group(g) => Box::new(g.members.iter()),
        }
    }
}

impl From<Agent> for Actor {
    fn from(agent: Agent) -> Self {
        Self::Agent(agent)
    }
}

impl From<Group> for Actor {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

/// The combined view of every identity known for one person.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Person {
    pub names: Vec<String>,
    pub mboxes: Vec<String>,
    pub mbox_sha1_sums: Vec<String>,
    pub openids: Vec<String>,
    pub accounts: Vec<Account>,
}

impl Person {
    /// Build a person from agents, de-duplicating while keeping first-seen order.
    #[must_use]
    pub fn from_agents<'a>(agents: impl IntoIterator<Item = &'a Agent>) -> Self {
        let mut person = Self::default();
        for agent in agents {
            person.absorb(agent);
        }
        person
    }

    /// Merge one agent's name and identifier into this person.
    pub fn absorb(&mut self, agent: &Agent) {
        if let Some(name) = &agent.name {
            push_unique(&mut self.names, name.clone());
        }
        match &agent.ifi {
            InverseFunctionalIdentifier::Mbox(v) => push_unique(&mut self.mboxes, v.clone()),
            InverseFunctionalIdentifier::MboxSha1Sum(v) => {
                push_unique(&mut self.mbox_sha1_sums, v.clone());
            }
            InverseFunctionalIdentifier::OpenId(v) => push_unique(&mut self.openids, v.clone()),
            InverseFunctionalIdentifier::Account(a) => push_unique(&mut self.accounts, a.clone()),
        }
    }
}

fn push_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}
