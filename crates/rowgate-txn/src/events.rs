//! Pending events and post-commit handlers

use async_trait::async_trait;
use rowgate_common::{Result, Row, Session};
use rowgate_query::{Condition, InstanceState, ReferencedEntity};

use crate::ledger::GroupKey;

/// Called once per committed event
///
/// Every method defaults to doing nothing.
#[async_trait]
pub trait PostCommitHandler: Send + Sync {
    async fn after_single_create(&self, _session: &Session, _instance: &InstanceState) -> Result<()> {
        Ok(())
    }

    async fn after_single_delete(&self, _session: &Session, _instance: &InstanceState) -> Result<()> {
        Ok(())
    }

    async fn after_single_update(
        &self,
        _session: &Session,
        _instance: &InstanceState,
        _changes: &Row,
    ) -> Result<()> {
        Ok(())
    }

    async fn after_many_insert(
        &self,
        _session: &Session,
        _entity: &ReferencedEntity,
        _values: &[Row],
    ) -> Result<()> {
        Ok(())
    }

    async fn after_many_delete(
        &self,
        _session: &Session,
        _entity: &ReferencedEntity,
        _condition: Option<&Condition>,
    ) -> Result<()> {
        Ok(())
    }

    async fn after_many_update(
        &self,
        _session: &Session,
        _entity: &ReferencedEntity,
        _condition: Option<&Condition>,
        _changes: &Row,
    ) -> Result<()> {
        Ok(())
    }
}

/// Post-commit handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPostCommitHandler;

impl PostCommitHandler for NoopPostCommitHandler {}

/// A change recorded during a transaction, fired after commit
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEvent {
    CreateSingle(InstanceState),
    DeleteSingle(InstanceState),
    UpdateSingle {
        instance: InstanceState,
        changes: Row,
    },
    CreateMany {
        entity: ReferencedEntity,
        values: Vec<Row>,
    },
    DeleteMany {
        entity: ReferencedEntity,
        condition: Option<Condition>,
    },
    UpdateMany {
        entity: ReferencedEntity,
        condition: Option<Condition>,
        changes: Row,
    },
}

impl PendingEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PendingEvent::CreateSingle(_) => "create_single",
            PendingEvent::DeleteSingle(_) => "delete_single",
            PendingEvent::UpdateSingle { .. } => "update_single",
            PendingEvent::CreateMany { .. } => "create_many",
            PendingEvent::DeleteMany { .. } => "delete_many",
            PendingEvent::UpdateMany { .. } => "update_many",
        }
    }

    /// Ledger group: single-object events group by identity
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        let instance = match self {
            PendingEvent::CreateSingle(instance)
            | PendingEvent::DeleteSingle(instance)
            | PendingEvent::UpdateSingle { instance, .. } => instance,
            _ => return GroupKey::Ungrouped,
        };
        instance
            .identity
            .clone()
            .map_or(GroupKey::Ungrouped, GroupKey::Identity)
    }

    /// Invoke the matching handler method
    pub async fn trigger(&self, session: &Session, handler: &dyn PostCommitHandler) -> Result<()> {
        match self {
            PendingEvent::CreateSingle(instance) => handler.after_single_create(session, instance).await,
            PendingEvent::DeleteSingle(instance) => handler.after_single_delete(session, instance).await,
            PendingEvent::UpdateSingle { instance, changes } => {
                handler.after_single_update(session, instance, changes).await
            }
            PendingEvent::CreateMany { entity, values } => {
                handler.after_many_insert(session, entity, values).await
            }
            PendingEvent::DeleteMany { entity, condition } => {
                handler
                    .after_many_delete(session, entity, condition.as_ref())
                    .await
            }
            PendingEvent::UpdateMany {
                entity,
                condition,
                changes,
            } => {
                handler
                    .after_many_update(session, entity, condition.as_ref(), changes)
                    .await
            }
        }
    }
}
