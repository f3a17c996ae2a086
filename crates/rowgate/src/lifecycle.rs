//! Host lifecycle boundary
//!
//! The host ORM calls a [`LifecycleListener`] at statement execution and at
//! each step of the flush/commit cycle.

use std::sync::Arc;

use rowgate_common::{Parameters, Result, Session};
use rowgate_query::{EntityRegistry, FlushContext, Statement};
use rowgate_txn::{PendingEvent, TxnHandle};

/// A statement about to be executed
#[derive(Debug, Clone)]
pub struct ExecuteState {
    /// Statement as it will be sent; listeners may rewrite it
    pub statement: Statement,
    pub parameters: Parameters,
    /// Entity registry bound to the execution, if any
    pub registry: Option<Arc<EntityRegistry>>,
    /// Event for the write, recorded once the statement succeeds
    pub(crate) pending: Option<PendingEvent>,
}

impl ExecuteState {
    pub fn new(statement: impl Into<Statement>) -> Self {
        Self {
            statement: statement.into(),
            parameters: Parameters::None,
            registry: None,
            pending: None,
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_registry(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// Whether a flush may go ahead
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushDecision {
    Proceed,
    /// The host must roll the transaction back instead of flushing
    Rollback { reason: String },
}

impl FlushDecision {
    #[must_use]
    pub fn is_rollback(&self) -> bool {
        matches!(self, FlushDecision::Rollback { .. })
    }
}

/// Callbacks invoked by the host
pub trait LifecycleListener: Send + Sync {
    /// Before a statement executes
    fn on_execute(&self, session: &Session, txn: &TxnHandle, state: &mut ExecuteState) -> Result<()>;

    /// After a statement executed successfully; not called when it failed
    fn after_execute(&self, session: &Session, txn: &TxnHandle, state: &mut ExecuteState) -> Result<()>;

    /// Before tracked objects are written
    fn before_flush(&self, session: &Session, txn: &TxnHandle, flush: &FlushContext) -> Result<FlushDecision>;

    /// After objects are written, before per-object state is reset
    fn after_flush(&self, session: &Session, txn: &TxnHandle, flush: &FlushContext) -> Result<()>;

    /// After per-object state is final; inserted objects carry their identity
    fn after_flush_postexec(&self, session: &Session, txn: &TxnHandle, flush: &FlushContext) -> Result<()>;

    /// After the transaction committed; the host ends `txn` afterwards
    fn after_commit(&self, session: &Session, txn: &TxnHandle) -> Result<()>;

    /// After the transaction rolled back; the host ends `txn` afterwards
    fn after_rollback(&self, session: &Session, txn: &TxnHandle);
}

/// A host that accepts lifecycle listeners
pub trait HostEvents {
    fn listen(&mut self, listener: Arc<dyn LifecycleListener>);
}
