//! Broadcast feed of committed changes
//!
//! A post-commit handler that republishes committed events for downstream
//! subscribers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rowgate_common::{Result, Row, Session};
use rowgate_query::{Condition, IdentityKey, InstanceState, ReferencedEntity};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::events::PostCommitHandler;

/// Type of committed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// A committed change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Session that committed the change
    pub session: Uuid,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Entity name
    pub entity: String,
    /// Identity of the object, for single-object changes
    pub identity: Option<IdentityKey>,
    /// Object values or inserted rows
    pub records: Vec<Row>,
    /// Assigned values, for updates
    pub changes: Option<Row>,
    /// Statement condition, for bulk updates and deletes
    pub condition: Option<Condition>,
    pub commit_timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    fn new(session: &Session, change_type: ChangeType, entity: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: session.id(),
            change_type,
            entity: entity.to_string(),
            identity: None,
            records: Vec::new(),
            changes: None,
            condition: None,
            commit_timestamp: Utc::now(),
        }
    }

    fn single(session: &Session, change_type: ChangeType, instance: &InstanceState) -> Self {
        Self {
            identity: instance.identity.clone(),
            records: vec![instance.values.clone()],
            ..Self::new(session, change_type, instance.entity.name())
        }
    }

    /// Serialize to JSON for transport
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Publishes committed changes on a broadcast channel
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: ChangeEvent) {
        let entity = event.entity.clone();
        if self.sender.send(event).is_err() {
            debug!(entity = %entity, "No change feed subscribers");
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PostCommitHandler for ChangeFeed {
    async fn after_single_create(&self, session: &Session, instance: &InstanceState) -> Result<()> {
        self.publish(ChangeEvent::single(session, ChangeType::Insert, instance));
        Ok(())
    }

    async fn after_single_delete(&self, session: &Session, instance: &InstanceState) -> Result<()> {
        self.publish(ChangeEvent::single(session, ChangeType::Delete, instance));
        Ok(())
    }

    async fn after_single_update(
        &self,
        session: &Session,
        instance: &InstanceState,
        changes: &Row,
    ) -> Result<()> {
        self.publish(ChangeEvent {
            changes: Some(changes.clone()),
            ..ChangeEvent::single(session, ChangeType::Update, instance)
        });
        Ok(())
    }

    async fn after_many_insert(
        &self,
        session: &Session,
        entity: &ReferencedEntity,
        values: &[Row],
    ) -> Result<()> {
        self.publish(ChangeEvent {
            records: values.to_vec(),
            ..ChangeEvent::new(session, ChangeType::Insert, entity.name())
        });
        Ok(())
    }

    async fn after_many_delete(
        &self,
        session: &Session,
        entity: &ReferencedEntity,
        condition: Option<&Condition>,
    ) -> Result<()> {
        self.publish(ChangeEvent {
            condition: condition.cloned(),
            ..ChangeEvent::new(session, ChangeType::Delete, entity.name())
        });
        Ok(())
    }

    async fn after_many_update(
        &self,
        session: &Session,
        entity: &ReferencedEntity,
        condition: Option<&Condition>,
        changes: &Row,
    ) -> Result<()> {
        self.publish(ChangeEvent {
            condition: condition.cloned(),
            changes: Some(changes.clone()),
            ..ChangeEvent::new(session, ChangeType::Update, entity.name())
        });
        Ok(())
    }
}
