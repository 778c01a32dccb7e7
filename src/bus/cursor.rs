//! Per-subscriber cursor state
//!
//! A cursor tracks one subscriber's position in the shared buffer: the index
//! of the next envelope to deliver, whether the previous delivery has been
//! committed, the subscriber's handler, its cancellation token (a child of
//! the bus root token), its private dead-letter queue, and delivery
//! statistics.
//!
//! Index and commit flag are mutated by the owning dispatch loop and by the
//! pruner's index arithmetic, both under the store lock. The DLQ has its own
//! per-cursor lock shared between the dispatch loop (appends) and the replay
//! operations (reads/removes).

use crate::bus::error::{BusError, BusResult};
use crate::bus::message::Envelope;
use crate::bus::traits::Subscriber;
use crate::core::sync::handle_lock_poison;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Delivery statistics for one subscriber
///
/// Counters are monotonic and updated with relaxed atomics; readers may see
/// slightly stale values, which is acceptable for diagnostics.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    attempts: AtomicU64,
    acked: AtomicU64,
    dead_lettered: AtomicU64,
}

impl DeliveryStats {
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ack(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dead_letter(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }
}

/// State owned by one subscription
pub(crate) struct Cursor {
    pub(crate) id: Uuid,
    /// Index of the next envelope to deliver; equal to the buffer length
    /// when the subscriber is caught up
    pub(crate) index: AtomicUsize,
    /// False while a delivery is in flight or blocked; true once the cursor
    /// has advanced past the previous envelope
    pub(crate) committed: AtomicBool,
    pub(crate) handler: Arc<dyn Subscriber>,
    pub(crate) cancel: CancellationToken,
    dlq: Mutex<Vec<Envelope>>,
    pub(crate) stats: DeliveryStats,
}

impl Cursor {
    pub(crate) fn new(handler: Arc<dyn Subscriber>, cancel: CancellationToken) -> Self {
        Self {
            id: Uuid::new_v4(),
            index: AtomicUsize::new(0),
            committed: AtomicBool::new(true),
            handler,
            cancel,
            dlq: Mutex::new(Vec::new()),
            stats: DeliveryStats::default(),
        }
    }

    /// Append an envelope to this subscriber's dead-letter queue
    pub(crate) fn push_dead_letter(&self, envelope: Envelope) -> BusResult<()> {
        let mut dlq = handle_lock_poison(self.dlq.lock(), |msg| BusError::Internal {
            message: msg,
        })?;
        dlq.push(envelope);
        self.stats.record_dead_letter();
        Ok(())
    }

    /// Copy of the dead-letter queue in insertion order
    pub(crate) fn dead_letters(&self) -> BusResult<Vec<Envelope>> {
        let dlq = handle_lock_poison(self.dlq.lock(), |msg| BusError::Internal {
            message: msg,
        })?;
        Ok(dlq.clone())
    }

    /// Look up a dead-letter entry by envelope id
    pub(crate) fn find_dead_letter(&self, message_id: Uuid) -> BusResult<Option<Envelope>> {
        let dlq = handle_lock_poison(self.dlq.lock(), |msg| BusError::Internal {
            message: msg,
        })?;
        Ok(dlq.iter().find(|e| e.id == message_id).cloned())
    }

    /// Remove a dead-letter entry by envelope id; returns whether it was present
    pub(crate) fn remove_dead_letter(&self, message_id: Uuid) -> BusResult<bool> {
        let mut dlq = handle_lock_poison(self.dlq.lock(), |msg| BusError::Internal {
            message: msg,
        })?;
        match dlq.iter().position(|e| e.id == message_id) {
            Some(position) => {
                dlq.remove(position);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
