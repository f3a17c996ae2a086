//! Handlers that record what they were called with

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rowgate::{AllowAll, AuthorizationHandler, FilterStream, PostCommitHandler};
use rowgate_common::{Error, Result, Row, Session};
use rowgate_query::{Condition, InstanceState, ReferencedEntity};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthCall {
    Select {
        entities: Vec<ReferencedEntity>,
        condition: Option<Condition>,
    },
    Insert {
        entity: ReferencedEntity,
        values: Vec<Row>,
    },
    Update {
        entities: Vec<ReferencedEntity>,
        condition: Option<Condition>,
        changes: Row,
    },
    Delete {
        entities: Vec<ReferencedEntity>,
        condition: Option<Condition>,
    },
}

/// Records every call, then delegates to the wrapped handler
pub struct RecordingAuth {
    inner: Arc<dyn AuthorizationHandler>,
    calls: Mutex<Vec<(Uuid, AuthCall)>>,
}

impl Default for RecordingAuth {
    fn default() -> Self {
        Self::wrap(Arc::new(AllowAll))
    }
}

impl RecordingAuth {
    pub fn wrap(inner: Arc<dyn AuthorizationHandler>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<AuthCall> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn sessions(&self) -> Vec<Uuid> {
        self.calls.lock().iter().map(|(id, _)| *id).collect()
    }

    fn record(&self, session: &Session, call: AuthCall) {
        self.calls.lock().push((session.id(), call));
    }
}

impl AuthorizationHandler for RecordingAuth {
    fn before_select<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        self.record(
            session,
            AuthCall::Select {
                entities: entities.to_vec(),
                condition: condition.cloned(),
            },
        );
        self.inner.before_select(session, entities, condition)
    }

    fn before_insert<'a>(
        &'a self,
        session: &'a Session,
        entity: &'a ReferencedEntity,
        values: &'a [Row],
    ) -> FilterStream<'a> {
        self.record(
            session,
            AuthCall::Insert {
                entity: entity.clone(),
                values: values.to_vec(),
            },
        );
        self.inner.before_insert(session, entity, values)
    }

    fn before_update<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        condition: Option<&'a Condition>,
        changes: &'a Row,
    ) -> FilterStream<'a> {
        self.record(
            session,
            AuthCall::Update {
                entities: entities.to_vec(),
                condition: condition.cloned(),
                changes: changes.clone(),
            },
        );
        self.inner.before_update(session, entities, condition, changes)
    }

    fn before_delete<'a>(
        &'a self,
        session: &'a Session,
        entities: &'a [ReferencedEntity],
        condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        self.record(
            session,
            AuthCall::Delete {
                entities: entities.to_vec(),
                condition: condition.cloned(),
            },
        );
        self.inner.before_delete(session, entities, condition)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PostCall {
    SingleCreate(InstanceState),
    SingleDelete(InstanceState),
    SingleUpdate { instance: InstanceState, changes: Row },
    ManyInsert { entity: ReferencedEntity, values: Vec<Row> },
    ManyDelete { entity: ReferencedEntity, condition: Option<Condition> },
    ManyUpdate {
        entity: ReferencedEntity,
        condition: Option<Condition>,
        changes: Row,
    },
}

impl PostCall {
    pub fn entity_name(&self) -> &str {
        match self {
            PostCall::SingleCreate(instance)
            | PostCall::SingleDelete(instance)
            | PostCall::SingleUpdate { instance, .. } => instance.entity.name(),
            PostCall::ManyInsert { entity, .. }
            | PostCall::ManyDelete { entity, .. }
            | PostCall::ManyUpdate { entity, .. } => entity.name(),
        }
    }
}

/// Records post-commit events
///
/// Optionally sleeps before recording, and fails after recording the
/// `fail_after`-th call.
#[derive(Default)]
pub struct RecordingPostCommit {
    calls: Mutex<Vec<(Uuid, PostCall)>>,
    delay: Option<Duration>,
    fail_after: Option<usize>,
}

impl RecordingPostCommit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_after(mut self, calls: usize) -> Self {
        self.fail_after = Some(calls);
        self
    }

    pub fn calls(&self) -> Vec<PostCall> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn sessions(&self) -> Vec<Uuid> {
        self.calls.lock().iter().map(|(id, _)| *id).collect()
    }

    async fn record(&self, session: &Session, call: PostCall) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let count = {
            let mut calls = self.calls.lock();
            calls.push((session.id(), call));
            calls.len()
        };
        match self.fail_after {
            Some(limit) if count >= limit => Err(Error::handler(anyhow::anyhow!("handler failed on call {count}"))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PostCommitHandler for RecordingPostCommit {
    async fn after_single_create(&self, session: &Session, instance: &InstanceState) -> Result<()> {
        self.record(session, PostCall::SingleCreate(instance.clone())).await
    }

    async fn after_single_delete(&self, session: &Session, instance: &InstanceState) -> Result<()> {
        self.record(session, PostCall::SingleDelete(instance.clone())).await
    }

    async fn after_single_update(&self, session: &Session, instance: &InstanceState, changes: &Row) -> Result<()> {
        self.record(
            session,
            PostCall::SingleUpdate {
                instance: instance.clone(),
                changes: changes.clone(),
            },
        )
        .await
    }

    async fn after_many_insert(&self, session: &Session, entity: &ReferencedEntity, values: &[Row]) -> Result<()> {
        self.record(
            session,
            PostCall::ManyInsert {
                entity: entity.clone(),
                values: values.to_vec(),
            },
        )
        .await
    }

    async fn after_many_delete(
        &self,
        session: &Session,
        entity: &ReferencedEntity,
        condition: Option<&Condition>,
    ) -> Result<()> {
        self.record(
            session,
            PostCall::ManyDelete {
                entity: entity.clone(),
                condition: condition.cloned(),
            },
        )
        .await
    }

    async fn after_many_update(
        &self,
        session: &Session,
        entity: &ReferencedEntity,
        condition: Option<&Condition>,
        changes: &Row,
    ) -> Result<()> {
        self.record(
            session,
            PostCall::ManyUpdate {
                entity: entity.clone(),
                condition: condition.cloned(),
                changes: changes.clone(),
            },
        )
        .await
    }
}
