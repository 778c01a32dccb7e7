//! Diagnostic state snapshots
//!
//! [`MessageBus::get_state`](crate::bus::MessageBus::get_state) produces
//! these types. The buffer copy is consistent (taken under the store lock);
//! per-subscriber fields are read without coordination and may be slightly
//! stale, which is acceptable for diagnostics.

use crate::bus::cursor::Cursor;
use crate::bus::error::BusResult;
use crate::bus::message::Envelope;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use uuid::Uuid;

/// Point-in-time view of the whole bus
#[derive(Debug, Clone, Serialize)]
pub struct BusSnapshot {
    /// Consistent copy of the buffer, oldest first
    pub buffer: Vec<Envelope>,
    /// One entry per live subscriber, in registry order
    pub subscribers: Vec<CursorSnapshot>,
    /// Configured envelope time-to-live
    pub ttl: Duration,
}

impl BusSnapshot {
    /// Find a subscriber's snapshot by id
    pub fn subscriber(&self, subscriber_id: Uuid) -> Option<&CursorSnapshot> {
        self.subscribers
            .iter()
            .find(|s| s.subscriber_id == subscriber_id)
    }

    /// Number of envelopes a subscriber has not yet resolved
    pub fn pending_for(&self, subscriber_id: Uuid) -> Option<usize> {
        self.subscriber(subscriber_id)
            .map(|s| self.buffer.len().saturating_sub(s.index))
    }
}

/// Point-in-time view of one subscriber's cursor
#[derive(Debug, Clone, Serialize)]
pub struct CursorSnapshot {
    pub subscriber_id: Uuid,
    /// Index of the next envelope to deliver
    pub index: usize,
    /// False while a delivery is in flight or blocked
    pub committed: bool,
    /// Dead-letter queue contents in insertion order
    pub dead_letters: Vec<Envelope>,
    /// Total `on_message_receive` invocations
    pub attempts: u64,
    /// Deliveries that ended in Ack
    pub acked: u64,
    /// Envelopes quarantined to the DLQ
    pub dead_lettered: u64,
}

impl CursorSnapshot {
    pub(crate) fn capture(cursor: &Cursor) -> BusResult<Self> {
        Ok(Self {
            subscriber_id: cursor.id,
            index: cursor.index.load(Ordering::SeqCst),
            committed: cursor.committed.load(Ordering::SeqCst),
            dead_letters: cursor.dead_letters()?,
            attempts: cursor.stats.attempts(),
            acked: cursor.stats.acked(),
            dead_lettered: cursor.stats.dead_lettered(),
        })
    }
}
