//! rowgate - Row-level authorization hooks for ORM sessions
//!
//! Intercepts statement execution and the flush/commit lifecycle of a host
//! ORM session:
//! - Splices authorization restrictions into SELECT, INSERT, UPDATE and DELETE
//! - Checks every object of a flush and aborts the flush on denial
//! - Buffers change events per transaction and fires them after commit
//! - Runs async handler code on a dedicated background loop

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bridge;
pub mod hooks;
pub mod lifecycle;

use std::sync::Arc;

use tracing::info;

pub use bridge::Bridge;
pub use hooks::AuthHooks;
pub use lifecycle::{ExecuteState, FlushDecision, HostEvents, LifecycleListener};

pub use rowgate_common::{self as common, Config, Error, Parameters, Result, Row, Session, SessionKind, Value};
pub use rowgate_query as query;
pub use rowgate_security::{self as security, AllowAll, AuthorizationHandler, FilterStream};
pub use rowgate_txn::{self as txn, PostCommitHandler, TxnHandle};

/// Attach authorization and event hooks to a host
///
/// Starts the background loop the hooks run handler code on. The loop stops
/// once the returned hooks and the host's listener are dropped.
pub fn register_hooks<H>(
    host: &mut H,
    authorization: Arc<dyn AuthorizationHandler>,
    post_commit: Arc<dyn PostCommitHandler>,
    config: &Config,
) -> Result<Arc<AuthHooks>>
where
    H: HostEvents + ?Sized,
{
    let bridge = Arc::new(Bridge::start(&config.bridge)?);
    let hooks = Arc::new(AuthHooks::new(authorization, post_commit, bridge, config));
    host.listen(hooks.clone());
    info!("Registered authorization hooks");
    Ok(hooks)
}
