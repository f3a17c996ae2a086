//! Unit-of-work object model
//!
//! The host reports tracked objects to the flush hooks as [`InstanceState`]
//! snapshots.

use std::sync::Arc;

use rowgate_common::{Row, Value};
use serde::{Deserialize, Serialize};

use crate::resolver::ReferencedEntity;
use crate::schema::Entity;

/// Identity of a persistent object: entity name plus primary-key values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityKey {
    pub entity: String,
    pub values: Vec<Value>,
}

impl IdentityKey {
    /// Identity from an object's column values
    ///
    /// `None` when the entity has no primary key or a key column is unset.
    #[must_use]
    pub fn from_values(entity: &Entity, values: &Row) -> Option<Self> {
        let key = entity.table().primary_key();
        if key.is_empty() {
            return None;
        }
        let values = key
            .iter()
            .map(|column| values.get(column).filter(|v| !v.is_null()).cloned())
            .collect::<Option<Vec<Value>>>()?;
        Some(Self {
            entity: entity.name().to_string(),
            values,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    /// Added, not yet flushed
    Pending,
    /// Loaded or flushed
    Persistent,
    /// Marked for deletion
    Deleted,
    /// No longer tracked
    Detached,
}

/// Snapshot of a tracked object during a flush
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceState {
    pub entity: Arc<Entity>,
    pub identity: Option<IdentityKey>,
    pub status: ObjectStatus,
    /// Current column values
    pub values: Row,
    /// Attributes changed since the previous flush, with their new values
    pub changes: Row,
    /// Inserted by the flush being reported
    pub inserted: bool,
}

impl InstanceState {
    /// A new object awaiting insertion
    #[must_use]
    pub fn pending(entity: Arc<Entity>, values: Row) -> Self {
        Self {
            entity,
            identity: None,
            status: ObjectStatus::Pending,
            values,
            changes: Row::new(),
            inserted: false,
        }
    }

    /// An object loaded from the database
    #[must_use]
    pub fn persistent(entity: Arc<Entity>, values: Row) -> Self {
        let identity = IdentityKey::from_values(&entity, &values);
        Self {
            entity,
            identity,
            status: ObjectStatus::Persistent,
            values,
            changes: Row::new(),
            inserted: false,
        }
    }

    /// Change one attribute, tracking the new value
    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        let value = value.into();
        self.values.insert(column.to_string(), value.clone());
        self.changes.insert(column.to_string(), value);
    }

    /// Mark the object as inserted and assign its identity
    pub fn mark_inserted(&mut self) {
        self.status = ObjectStatus::Persistent;
        self.identity = IdentityKey::from_values(&self.entity, &self.values);
        self.inserted = true;
    }

    /// An update the flush writes: persistent, identified, with changes
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.status == ObjectStatus::Persistent
            && self.identity.is_some()
            && !self.inserted
            && !self.changes.is_empty()
    }

    #[must_use]
    pub fn referenced(&self) -> ReferencedEntity {
        ReferencedEntity::base(self.entity.clone())
    }
}

/// Objects taking part in one flush
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushContext {
    pub states: Vec<InstanceState>,
}

impl FlushContext {
    #[must_use]
    pub fn new(states: Vec<InstanceState>) -> Self {
        Self { states }
    }

    pub fn pending(&self) -> impl Iterator<Item = &InstanceState> {
        self.states
            .iter()
            .filter(|s| s.status == ObjectStatus::Pending)
    }

    pub fn modified(&self) -> impl Iterator<Item = &InstanceState> {
        self.states.iter().filter(|s| s.is_modified())
    }

    pub fn inserted(&self) -> impl Iterator<Item = &InstanceState> {
        self.states.iter().filter(|s| s.inserted)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &InstanceState> {
        self.states
            .iter()
            .filter(|s| s.status == ObjectStatus::Deleted)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
