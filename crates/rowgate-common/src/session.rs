//! Session variants seen by the hooks
//!
//! Only authorized sessions are subject to authorization and event tracking.
//! Unauthorized sessions are the explicit opt-out; any other session is
//! skipped with a warning.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

/// Opaque principal carried by an authorized session
#[derive(Clone)]
pub struct Principal(Arc<dyn Any + Send + Sync>);

impl Principal {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the principal as a concrete type
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Principal(..)")
    }
}

/// Session variant
#[derive(Debug, Clone)]
pub enum SessionKind {
    /// Subject to authorization and event tracking on behalf of a principal
    Authorized(Principal),
    /// Explicit opt-out of the hooks
    Unauthorized,
    /// A session the hooks were never configured for
    Unchecked,
}

/// A host session as seen by the hooks
///
/// Sessions compare by identity, so handlers can check which session a
/// callback was invoked for.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    kind: SessionKind,
}

impl Session {
    /// Create an authorized session for a principal
    pub fn authorized<T: Any + Send + Sync>(principal: T) -> Self {
        Self::with_kind(SessionKind::Authorized(Principal::new(principal)))
    }

    /// Create a session that opts out of authorization
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::with_kind(SessionKind::Unauthorized)
    }

    /// Create a plain session
    #[must_use]
    pub fn unchecked() -> Self {
        Self::with_kind(SessionKind::Unchecked)
    }

    #[must_use]
    pub fn with_kind(kind: SessionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        match &self.kind {
            SessionKind::Authorized(principal) => Some(principal),
            _ => None,
        }
    }

    /// Borrow the principal as a concrete type
    #[must_use]
    pub fn principal_as<T: Any>(&self) -> Option<&T> {
        self.principal().and_then(Principal::downcast_ref::<T>)
    }

    /// Whether the hooks must leave this session alone
    ///
    /// Logs a warning for sessions that are neither authorized nor an
    /// explicit opt-out.
    #[must_use]
    pub fn bypasses_hooks(&self) -> bool {
        match &self.kind {
            SessionKind::Authorized(_) => false,
            SessionKind::Unauthorized => true,
            SessionKind::Unchecked => {
                warn!(
                    session = %self.id,
                    "Session is neither authorized nor unauthorized; skipping authorization hooks"
                );
                true
            }
        }
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}
