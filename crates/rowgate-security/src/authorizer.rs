//! Authorization pipeline
//!
//! Statement-level: restrictions from the handler are spliced into the
//! statement so the database only ever touches permitted rows.
//! Object-level: every object in a flush is checked on its own and any
//! restriction other than TRUE denies the whole flush.

use std::slice;
use std::sync::Arc;

use futures::TryStreamExt;
use rowgate_common::{Result, Session};
use rowgate_query::{
    Analysis, AnalyzedStatement, Condition, Expr, FlushContext, InstanceState, ObjectStatus,
    ReferencedEntity, Restriction, Statement, StatementKind,
};
use tracing::{debug, warn};

use crate::handler::{AuthorizationHandler, FilterStream};

/// Restrictions collected for one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementFilters {
    /// Restrictions on the statement itself
    pub restrictions: Vec<Restriction>,
    /// Restrictions on the embedded query of an INSERT ... SELECT
    pub source: Vec<Restriction>,
}

/// Outcome of the object-level checks for one flush
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectVerdict {
    Allowed,
    Denied {
        entity: String,
        action: StatementKind,
        predicate: Expr,
    },
}

impl ObjectVerdict {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, ObjectVerdict::Allowed)
    }
}

/// Runs the authorization handler for statements and flushed objects
#[derive(Clone)]
pub struct StatementAuthorizer {
    handler: Arc<dyn AuthorizationHandler>,
}

impl StatementAuthorizer {
    #[must_use]
    pub fn new(handler: Arc<dyn AuthorizationHandler>) -> Self {
        Self { handler }
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<dyn AuthorizationHandler> {
        &self.handler
    }

    async fn select_restrictions(
        &self,
        session: &Session,
        analysis: &Analysis,
    ) -> Result<Vec<Restriction>> {
        self.handler
            .before_select(session, &analysis.entities, analysis.condition.as_ref())
            .try_collect()
            .await
    }

    /// Ask the handler for the restrictions of an analyzed statement
    pub async fn authorize(
        &self,
        session: &Session,
        analyzed: &AnalyzedStatement,
    ) -> Result<StatementFilters> {
        let filters = match analyzed {
            AnalyzedStatement::Select(analysis) => StatementFilters {
                restrictions: self.select_restrictions(session, analysis).await?,
                source: Vec::new(),
            },
            AnalyzedStatement::Insert(analysis) => {
                let source = match &analysis.source {
                    Some(source) => self.select_restrictions(session, source).await?,
                    None => Vec::new(),
                };
                let restrictions = self
                    .handler
                    .before_insert(session, &analysis.entity, &analysis.values)
                    .try_collect()
                    .await?;
                StatementFilters {
                    restrictions,
                    source,
                }
            }
            AnalyzedStatement::Update(analysis) => StatementFilters {
                restrictions: self
                    .handler
                    .before_update(
                        session,
                        slice::from_ref(&analysis.entity),
                        analysis.condition.as_ref(),
                        &analysis.changes,
                    )
                    .try_collect()
                    .await?,
                source: Vec::new(),
            },
            AnalyzedStatement::Delete(analysis) => StatementFilters {
                restrictions: self
                    .handler
                    .before_delete(
                        session,
                        slice::from_ref(&analysis.entity),
                        analysis.condition.as_ref(),
                    )
                    .try_collect()
                    .await?,
                source: Vec::new(),
            },
        };

        debug!(
            restrictions = filters.restrictions.len(),
            source_restrictions = filters.source.len(),
            "Collected statement restrictions"
        );
        Ok(filters)
    }

    /// Splice collected restrictions into the statement
    ///
    /// Each restriction applies to every relation backed by its entity,
    /// aliases included, and to the embedded query of an INSERT ... SELECT.
    pub fn splice(statement: &mut Statement, filters: StatementFilters) {
        if let Statement::Insert(insert) = statement {
            if let Some(query) = insert.source_query_mut() {
                filters.source.into_iter().for_each(|r| query.restrict(r));
            }
        }
        for restriction in filters.restrictions {
            statement.restrict(restriction);
        }
    }

    /// Check every object of a flush
    ///
    /// Stops at the first restriction that is not TRUE.
    pub async fn authorize_objects(
        &self,
        session: &Session,
        flush: &FlushContext,
    ) -> Result<ObjectVerdict> {
        for state in &flush.states {
            let entity = state.referenced();
            let action = match state.status {
                ObjectStatus::Pending => StatementKind::Insert,
                ObjectStatus::Persistent if state.is_modified() => StatementKind::Update,
                ObjectStatus::Deleted => StatementKind::Delete,
                _ => continue,
            };
            let condition = Condition::primary_key(&entity, &state.values);

            let stream = self.object_stream(session, state, &entity, action, condition.as_ref());
            if let Some(verdict) = Self::first_denial(stream, state, action).await? {
                return Ok(verdict);
            }
        }
        Ok(ObjectVerdict::Allowed)
    }

    fn object_stream<'a>(
        &'a self,
        session: &'a Session,
        state: &'a InstanceState,
        entity: &'a ReferencedEntity,
        action: StatementKind,
        condition: Option<&'a Condition>,
    ) -> FilterStream<'a> {
        match action {
            StatementKind::Insert => {
                self.handler
                    .before_insert(session, entity, slice::from_ref(&state.values))
            }
            StatementKind::Update => self.handler.before_update(
                session,
                slice::from_ref(entity),
                condition,
                &state.changes,
            ),
            StatementKind::Delete | StatementKind::Select => {
                self.handler
                    .before_delete(session, slice::from_ref(entity), condition)
            }
        }
    }

    async fn first_denial(
        mut stream: FilterStream<'_>,
        state: &InstanceState,
        action: StatementKind,
    ) -> Result<Option<ObjectVerdict>> {
        while let Some(restriction) = stream.try_next().await? {
            if !restriction.is_tautology() {
                warn!(
                    entity = state.entity.name(),
                    action = %action,
                    predicate = %restriction.predicate,
                    "Object-level authorization denied"
                );
                return Ok(Some(ObjectVerdict::Denied {
                    entity: state.entity.name().to_string(),
                    action,
                    predicate: restriction.predicate,
                }));
            }
        }
        Ok(None)
    }
}
