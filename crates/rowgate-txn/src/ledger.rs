//! Per-transaction event ledger
//!
//! Events are buffered per transaction and grouped by the identity of the
//! object they concern. Commit drains a transaction's events in group
//! insertion order, then insertion order within each group. Rollback
//! discards them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rowgate_query::IdentityKey;
use tracing::debug;

use crate::events::PendingEvent;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one host transaction
///
/// Not `Clone`: the host owns exactly one handle per transaction and ends
/// it after the commit or rollback callbacks.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TxnHandle(u64);

impl TxnHandle {
    /// Start tracking a new transaction
    #[must_use]
    pub fn begin() -> Self {
        Self(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Ledger grouping key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Identity(IdentityKey),
    /// Statement-level events and objects without an identity
    Ungrouped,
}

#[derive(Debug)]
struct Bucket {
    key: GroupKey,
    events: Vec<PendingEvent>,
}

/// Pending events of every open transaction
#[derive(Debug, Default)]
pub struct EventLedger {
    transactions: DashMap<u64, Vec<Bucket>>,
}

impl EventLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            transactions: DashMap::with_capacity(capacity),
        }
    }

    /// Append an event to a transaction
    pub fn record(&self, txn: &TxnHandle, event: PendingEvent) {
        let key = event.group_key();
        let kind = event.kind();
        let mut buckets = self.transactions.entry(txn.id()).or_default();

        match buckets.iter_mut().find(|b| b.key == key) {
            Some(bucket) => bucket.events.push(event),
            None => buckets.push(Bucket {
                key,
                events: vec![event],
            }),
        }
        debug!(txn = txn.id(), kind, "Recorded pending event");
    }

    /// Remove a transaction's events in firing order
    pub fn take(&self, txn: &TxnHandle) -> Vec<PendingEvent> {
        let events: Vec<PendingEvent> = self
            .transactions
            .remove(&txn.id())
            .map(|(_, buckets)| buckets.into_iter().flat_map(|b| b.events).collect())
            .unwrap_or_default();
        debug!(txn = txn.id(), events = events.len(), "Drained pending events");
        events
    }

    /// Drop a transaction's events, returning how many were dropped
    pub fn discard(&self, txn: &TxnHandle) -> usize {
        let dropped = self
            .transactions
            .remove(&txn.id())
            .map_or(0, |(_, buckets)| buckets.iter().map(|b| b.events.len()).sum());
        debug!(txn = txn.id(), events = dropped, "Discarded pending events");
        dropped
    }

    /// Number of events recorded for a transaction
    #[must_use]
    pub fn pending(&self, txn: &TxnHandle) -> usize {
        self.transactions
            .get(&txn.id())
            .map_or(0, |buckets| buckets.iter().map(|b| b.events.len()).sum())
    }

    /// Number of transactions with recorded events
    #[must_use]
    pub fn open_transactions(&self) -> usize {
        self.transactions.len()
    }
}
