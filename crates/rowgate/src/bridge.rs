//! Sync/async bridge
//!
//! Host callbacks are synchronous while handlers are async. The bridge owns
//! one background thread running a single-threaded runtime; callers submit
//! a unit of work and block until its result comes back.

use std::future::Future;
use std::pin::Pin;
use std::thread::{self, ThreadId};

use crossbeam::channel::bounded;
use rowgate_common::config::BridgeConfig;
use rowgate_common::error::{BridgeError, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

type Unit = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle to the background loop
///
/// Units are spawned as tasks on the loop, so a unit awaiting another
/// unit's progress does not deadlock. The loop stops when the bridge is
/// dropped.
pub struct Bridge {
    /// Unit sender
    submit: mpsc::UnboundedSender<Unit>,
    /// Loop thread, for re-entrancy checks
    thread_id: ThreadId,
    thread_name: String,
}

impl Bridge {
    /// Start the background loop
    pub fn start(config: &BridgeConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (submit, mut units) = mpsc::unbounded_channel::<Unit>();

        let mut builder = thread::Builder::new().name(config.thread_name.clone());
        if config.stack_size_bytes > 0 {
            builder = builder.stack_size(config.stack_size_bytes);
        }

        let handle = builder
            .spawn(move || {
                runtime.block_on(async move {
                    while let Some(unit) = units.recv().await {
                        tokio::spawn(unit);
                    }
                });
                debug!("Bridge loop stopped");
            })
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;

        info!(thread = %config.thread_name, "Bridge loop started");

        Ok(Self {
            submit,
            thread_id: handle.thread().id(),
            thread_name: config.thread_name.clone(),
        })
    }

    /// Run a unit of work on the loop and wait for its result
    ///
    /// Fails with [`BridgeError::Reentrant`] when called from the loop
    /// thread itself, and with [`BridgeError::Dropped`] when the unit never
    /// replies (for instance because it panicked).
    pub fn block_on<F, T>(&self, unit: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Err(BridgeError::Reentrant.into());
        }

        let (reply_tx, reply_rx) = bounded(1);
        let task: Unit = Box::pin(async move {
            let _ = reply_tx.send(unit.await);
        });

        self.submit.send(task).map_err(|_| BridgeError::Closed)?;
        reply_rx.recv().map_err(|_| BridgeError::Dropped)?
    }

    #[must_use]
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }
}
