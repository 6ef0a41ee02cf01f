//! Process-wide map from correlation identifier to a one-shot reply callback.
//!
//! The synchronization point between the send and receive paths. The send
//! path registers a pending entry before publishing; the receive path (the
//! reply listener) and the deadline timer both race to remove it. Whichever
//! removal executes first wins; the loser observes an absent entry and is a
//! no-op, which is what makes resolution exactly-once.

use dashmap::DashMap;
use execq_core::CorrelationId;
use tokio::sync::oneshot;

/// Registry of pending requests keyed by correlation identifier.
///
/// Exclusively owns the id-to-callback mapping; the dispatcher holds no
/// independent copy, and the listener only looks entries up and fires them.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    pending: DashMap<CorrelationId, oneshot::Sender<Vec<u8>>>,
}

impl CorrelationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a one-shot reply callback for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already registered. Identifiers are minted fresh
    /// per request, so a duplicate is a programmer error, not a runtime
    /// condition.
    pub fn register(&self, id: CorrelationId, reply_tx: oneshot::Sender<Vec<u8>>) {
        let previous = self.pending.insert(id, reply_tx);
        assert!(previous.is_none(), "correlation id already registered");
    }

    /// Removes the entry for `id` and fires its callback with `payload`.
    ///
    /// Returns `false` when no entry exists — the normal outcome for stale,
    /// duplicate, or misrouted replies, never an error. A callback whose
    /// receiver has already been dropped is consumed silently.
    pub fn deliver(&self, id: &CorrelationId, payload: Vec<u8>) -> bool {
        match self.pending.remove(id) {
            Some((_, reply_tx)) => {
                // The receiver may be gone if the waiter was dropped between
                // deadline expiry and this removal; the entry is consumed
                // either way.
                let _ = reply_tx.send(payload);
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without firing it.
    ///
    /// Returns whether an entry was present. Used when the deadline fires or
    /// the owning caller abandons the wait.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Removes every entry, dropping the callbacks so each suspended caller
    /// observes a closed channel. Returns how many entries were drained.
    ///
    /// Used during shutdown so no pending wait is leaked.
    pub fn drain(&self) -> usize {
        let ids: Vec<CorrelationId> = self
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut drained = 0;
        for id in ids {
            if self.pending.remove(&id).is_some() {
                drained += 1;
            }
        }
        drained
    }
}
