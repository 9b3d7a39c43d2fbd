//! Composite identifiers for run queues
//!
//! A run queue is unique by `(entity, name)`; state stores both halves in a
//! single `entity:name` string. The entity must not contain `:`, the name may.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid composite ID '{0}': expected '<entity_name>:<name>'")]
pub struct MalformedIdentifier(pub String);

/// Two-part natural key of a run queue
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    pub entity: String,
    pub name: String,
}

impl CompositeId {
    pub fn new(entity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.entity, SEPARATOR, self.name)
    }
}

impl FromStr for CompositeId {
    type Err = MalformedIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s).map(|(entity, name)| Self::new(entity, name))
    }
}

/// Join owner scope and name into a composite identifier
pub fn encode(entity: &str, name: &str) -> String {
    CompositeId::new(entity, name).to_string()
}

/// Split a composite identifier at the first separator
pub fn decode(id: &str) -> Result<(&str, &str), MalformedIdentifier> {
    id.split_once(SEPARATOR)
        .ok_or_else(|| MalformedIdentifier(id.to_string()))
}
