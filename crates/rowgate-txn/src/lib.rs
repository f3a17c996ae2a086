//! Transaction-scoped event tracking
//!
//! Provides:
//! - Transaction handles
//! - The per-transaction event ledger
//! - Pending events and the post-commit handler capability
//! - A broadcast change feed for committed events

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod events;
pub mod feed;
pub mod ledger;

pub use events::{NoopPostCommitHandler, PendingEvent, PostCommitHandler};
pub use feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use ledger::{EventLedger, GroupKey, TxnHandle};
