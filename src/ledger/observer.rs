//! Change notification for the ledger.
//!
//! Listeners are called synchronously, in subscription order, on the thread that mutated the
//! ledger. A listener that returns an error or panics is logged and skipped; the remaining listeners
//! still run and the mutation still stands.

use crate::model::Transaction;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{trace, warn};

/// What happened to the ledger.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Add,
    Delete,
    Update,
    /// The whole ledger was reloaded from its backing file.
    Refresh,
}

serde_plain::derive_display_from_serialize!(ChangeKind);

/// A single change notification.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    kind: ChangeKind,
    transaction: Option<Transaction>,
}

impl LedgerEvent {
    pub fn new(kind: ChangeKind, transaction: Option<Transaction>) -> Self {
        Self { kind, transaction }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// The added, deleted or updated transaction. `None` for `Refresh`.
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }
}

/// Receives ledger change notifications.
pub trait LedgerListener: Send + Sync {
    fn on_change(&self, event: &LedgerEvent) -> Result<()>;
}

impl<F> LedgerListener for F
where
    F: Fn(&LedgerEvent) -> Result<()> + Send + Sync,
{
    fn on_change(&self, event: &LedgerEvent) -> Result<()> {
        self(event)
    }
}

/// Identifies a subscription so that it can be removed later.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ListenerId(u64);

/// The ordered list of subscribed listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    list: Mutex<Vec<(ListenerId, Arc<dyn LedgerListener>)>>,
}

impl Listeners {
    pub(crate) fn subscribe(&self, listener: Arc<dyn LedgerListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        list.len() != before
    }

    /// Calls every listener with `event`. The list is copied first so that a listener may subscribe
    /// or unsubscribe while being notified.
    pub(crate) fn notify(&self, event: &LedgerEvent) {
        let snapshot: Vec<(ListenerId, Arc<dyn LedgerListener>)> = self
            .list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        trace!("Notifying {} listeners of {}", snapshot.len(), event.kind());
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener.on_change(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Ledger listener {} failed on {}: {e:#}", id.0, event.kind()),
                Err(_) => warn!("Ledger listener {} panicked on {}", id.0, event.kind()),
            }
        }
    }
}

/// Forwards ledger changes to the subsystems that keep derived data (spending profiles,
/// recommendations) in sync. Events are sent over an unbounded channel so the receiving side can do
/// its work off the mutating thread.
#[derive(Debug, Clone)]
pub struct SyncFacade {
    sender: UnboundedSender<LedgerEvent>,
}

impl SyncFacade {
    /// Creates a facade and the receiver on which forwarded events arrive.
    pub fn channel() -> (Self, UnboundedReceiver<LedgerEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl LedgerListener for SyncFacade {
    fn on_change(&self, event: &LedgerEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("The sync receiver has been dropped"))
    }
}
