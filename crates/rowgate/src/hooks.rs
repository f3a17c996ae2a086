//! Authorization and event hooks
//!
//! Authorized sessions get restrictions spliced into every statement,
//! object-level checks before each flush, and their changes buffered per
//! transaction until commit. Every other session passes through untouched.

use std::sync::Arc;

use rowgate_common::config::{AnalysisConfig, MissingRegistryPolicy};
use rowgate_common::error::{AnalysisError, Result};
use rowgate_common::{Config, Session};
use rowgate_query::{
    Analysis, AnalyzedStatement, FlushContext, ObjectStatus, Statement, StatementAnalyzer,
};
use rowgate_security::{AuthorizationHandler, ObjectVerdict, StatementAuthorizer, StatementFilters};
use rowgate_txn::{EventLedger, PendingEvent, PostCommitHandler, TxnHandle};
use tracing::{debug, warn};

use crate::bridge::Bridge;
use crate::lifecycle::{ExecuteState, FlushDecision, LifecycleListener};

/// Hooks attached to a host by [`register_hooks`](crate::register_hooks)
pub struct AuthHooks {
    authorizer: Arc<StatementAuthorizer>,
    post_commit: Arc<dyn PostCommitHandler>,
    ledger: EventLedger,
    bridge: Arc<Bridge>,
    analysis: AnalysisConfig,
}

impl AuthHooks {
    pub fn new(
        authorization: Arc<dyn AuthorizationHandler>,
        post_commit: Arc<dyn PostCommitHandler>,
        bridge: Arc<Bridge>,
        config: &Config,
    ) -> Self {
        Self {
            authorizer: Arc::new(StatementAuthorizer::new(authorization)),
            post_commit,
            ledger: EventLedger::with_capacity(config.ledger.initial_capacity),
            bridge,
            analysis: config.analysis.clone(),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    #[must_use]
    pub fn bridge(&self) -> &Arc<Bridge> {
        &self.bridge
    }

    fn collect_filters(&self, session: &Session, analyzed: AnalyzedStatement) -> Result<StatementFilters> {
        let authorizer = self.authorizer.clone();
        let session = session.clone();
        self.bridge
            .block_on(async move { authorizer.authorize(&session, &analyzed).await })
    }

    fn on_missing_registry(&self, session: &Session, state: &mut ExecuteState) -> Result<()> {
        let kind = state.statement.kind();
        match self.analysis.missing_registry {
            MissingRegistryPolicy::Deny => {
                warn!(statement = %kind, "No entity registry bound to statement; refusing it");
                Err(AnalysisError::MissingRegistry(kind.to_string()).into())
            }
            MissingRegistryPolicy::Bypass => {
                warn!(statement = %kind, "No entity registry bound to statement; running it unfiltered");
                if let Statement::Select(_) = state.statement {
                    let filters = self.collect_filters(session, AnalyzedStatement::Select(Analysis::empty()))?;
                    StatementAuthorizer::splice(&mut state.statement, filters);
                }
                Ok(())
            }
        }
    }

    fn bulk_event(analyzed: AnalyzedStatement) -> Option<PendingEvent> {
        match analyzed {
            AnalyzedStatement::Select(_) => None,
            AnalyzedStatement::Insert(insert) => Some(PendingEvent::CreateMany {
                entity: insert.entity,
                values: insert.values,
            }),
            AnalyzedStatement::Update(update) => Some(PendingEvent::UpdateMany {
                entity: update.entity,
                condition: update.condition,
                changes: update.changes,
            }),
            AnalyzedStatement::Delete(delete) => Some(PendingEvent::DeleteMany {
                entity: delete.entity,
                condition: delete.condition,
            }),
        }
    }
}

impl LifecycleListener for AuthHooks {
    fn on_execute(&self, session: &Session, _txn: &TxnHandle, state: &mut ExecuteState) -> Result<()> {
        if session.bypasses_hooks() {
            return Ok(());
        }
        let Some(registry) = state.registry.clone() else {
            return self.on_missing_registry(session, state);
        };

        let analyzed = StatementAnalyzer::new(&registry).analyze(&state.statement, &state.parameters)?;
        let filters = self.collect_filters(session, analyzed.clone())?;
        StatementAuthorizer::splice(&mut state.statement, filters);
        state.pending = Self::bulk_event(analyzed);
        Ok(())
    }

    fn after_execute(&self, session: &Session, txn: &TxnHandle, state: &mut ExecuteState) -> Result<()> {
        if session.bypasses_hooks() {
            return Ok(());
        }
        if let Some(event) = state.pending.take() {
            self.ledger.record(txn, event);
        }
        Ok(())
    }

    fn before_flush(&self, session: &Session, _txn: &TxnHandle, flush: &FlushContext) -> Result<FlushDecision> {
        if session.bypasses_hooks() || flush.is_empty() {
            return Ok(FlushDecision::Proceed);
        }

        let authorizer = self.authorizer.clone();
        let owned_session = session.clone();
        let owned_flush = flush.clone();
        let verdict = self.bridge.block_on(async move {
            authorizer
                .authorize_objects(&owned_session, &owned_flush)
                .await
        })?;

        Ok(match verdict {
            ObjectVerdict::Allowed => FlushDecision::Proceed,
            ObjectVerdict::Denied {
                entity,
                action,
                predicate,
            } => FlushDecision::Rollback {
                reason: format!("{action} of {entity} is restricted to {predicate}"),
            },
        })
    }

    fn after_flush(&self, session: &Session, txn: &TxnHandle, flush: &FlushContext) -> Result<()> {
        if session.bypasses_hooks() {
            return Ok(());
        }
        for state in flush.modified() {
            self.ledger.record(
                txn,
                PendingEvent::UpdateSingle {
                    instance: state.clone(),
                    changes: state.changes.clone(),
                },
            );
        }
        Ok(())
    }

    fn after_flush_postexec(&self, session: &Session, txn: &TxnHandle, flush: &FlushContext) -> Result<()> {
        if session.bypasses_hooks() {
            return Ok(());
        }
        for state in &flush.states {
            if state.inserted {
                self.ledger.record(txn, PendingEvent::CreateSingle(state.clone()));
            } else if state.status == ObjectStatus::Deleted {
                self.ledger.record(txn, PendingEvent::DeleteSingle(state.clone()));
            }
        }
        Ok(())
    }

    fn after_commit(&self, session: &Session, txn: &TxnHandle) -> Result<()> {
        let txn_id = txn.id();
        let events = self.ledger.take(txn);
        if events.is_empty() {
            debug!(txn = txn_id, "No tracked events for committed transaction");
            return Ok(());
        }

        for event in events {
            let handler = self.post_commit.clone();
            let session = session.clone();
            self.bridge
                .block_on(async move { event.trigger(&session, handler.as_ref()).await })?;
        }
        debug!(txn = txn_id, "Dispatched post-commit events");
        Ok(())
    }

    fn after_rollback(&self, _session: &Session, txn: &TxnHandle) {
        let txn_id = txn.id();
        let dropped = self.ledger.discard(txn);
        if dropped > 0 {
            debug!(txn = txn_id, events = dropped, "Rolled back transaction; events discarded");
        }
    }
}
