//! Shared message store
//!
//! The store is the single append-ordered log every subscriber reads. All
//! mutations (appends, head trims, payload edits) and every piece of
//! cursor-index arithmetic driven by pruning run under one lock, so a trim
//! and the corresponding cursor shifts are a single atomic step and no
//! reader can observe a cursor pointing past a freshly shortened buffer.
//!
//! Envelopes are handed out as clones taken under the lock; the lock is
//! never held across a handler invocation.

use crate::bus::cursor::Cursor;
use crate::bus::error::{BusError, BusResult};
use crate::bus::message::Envelope;
use crate::core::sync::handle_lock_poison;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use uuid::Uuid;

/// Outcome of a cursor rewind request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RewindStatus {
    /// Cursor repositioned; the dispatch loop will re-deliver from there
    Rewound,
    /// A delivery is still in flight for this cursor
    NotCommitted,
    /// The cursor has not caught up with the buffer tail
    NotCaughtUp,
    /// The requested envelope is no longer in the buffer
    MessageMissing,
}

/// Append-ordered envelope log shared by all subscribers
pub(crate) struct MessageStore {
    entries: Mutex<VecDeque<Envelope>>,
}

impl MessageStore {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    fn lock(&self) -> BusResult<MutexGuard<'_, VecDeque<Envelope>>> {
        handle_lock_poison(self.entries.lock(), |msg| BusError::Internal {
            message: msg,
        })
    }

    /// Append a payload to the tail, assigning a fresh id and timestamp
    pub(crate) fn append(&self, payload: String) -> BusResult<Uuid> {
        let envelope = Envelope::new(payload);
        let id = envelope.id;
        let mut entries = self.lock()?;
        entries.push_back(envelope);
        Ok(id)
    }

    /// Envelope at the given logical index, or `None` past the tail
    #[allow(dead_code)]
    pub(crate) fn read_at(&self, index: usize) -> BusResult<Option<Envelope>> {
        let entries = self.lock()?;
        Ok(entries.get(index).cloned())
    }

    /// Read the envelope at a cursor's position and mark the delivery in flight
    ///
    /// The index read and the commit-flag clear happen under the store lock
    /// so a concurrent trim always sees either the pre-delivery or the
    /// post-delivery cursor, never a torn one.
    pub(crate) fn next_for(&self, cursor: &Cursor) -> BusResult<Option<Envelope>> {
        let entries = self.lock()?;
        let index = cursor.index.load(Ordering::SeqCst);
        match entries.get(index) {
            Some(envelope) => {
                cursor.committed.store(false, Ordering::SeqCst);
                Ok(Some(envelope.clone()))
            }
            None => Ok(None),
        }
    }

    /// Advance a cursor past the envelope it just resolved
    pub(crate) fn commit_advance(&self, cursor: &Cursor) -> BusResult<()> {
        let _entries = self.lock()?;
        cursor.index.fetch_add(1, Ordering::SeqCst);
        cursor.committed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Remove expired envelopes from the head and shift cursors in one step
    ///
    /// Trimming stops at the first non-expired envelope (head is oldest).
    /// Every cursor index is replaced with `max(0, index - k)` while the
    /// buffer lock is held. Returns the number of envelopes removed.
    pub(crate) fn trim_expired(
        &self,
        cutoff: SystemTime,
        cursors: &[Arc<Cursor>],
    ) -> BusResult<usize> {
        let mut entries = self.lock()?;
        let expired = entries
            .iter()
            .take_while(|envelope| envelope.created_at < cutoff)
            .count();
        if expired == 0 {
            return Ok(0);
        }
        entries.drain(..expired);
        for cursor in cursors {
            let _ = cursor
                .index
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |index| {
                    Some(index.saturating_sub(expired))
                });
        }
        Ok(expired)
    }

    /// Linear scan for an envelope's logical index; used only by replay
    #[allow(dead_code)]
    pub(crate) fn find_index_by_id(&self, message_id: Uuid) -> BusResult<Option<usize>> {
        let entries = self.lock()?;
        Ok(entries.iter().position(|e| e.id == message_id))
    }

    /// Shallow copy of the current log for state inspection
    pub(crate) fn snapshot(&self) -> BusResult<Vec<Envelope>> {
        let entries = self.lock()?;
        Ok(entries.iter().cloned().collect())
    }

    /// Edit an envelope's payload in place, preserving id and timestamp
    ///
    /// Returns whether the envelope was found.
    pub(crate) fn change_payload(&self, message_id: Uuid, payload: String) -> BusResult<bool> {
        let mut entries = self.lock()?;
        match entries.iter_mut().find(|e| e.id == message_id) {
            Some(envelope) => {
                envelope.payload = payload;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Number of envelopes currently in the buffer
    pub(crate) fn len(&self) -> BusResult<usize> {
        let entries = self.lock()?;
        Ok(entries.len())
    }

    /// Move a cursor back to an earlier buffer position
    ///
    /// Permitted only when the cursor is idle at the tail: committed, with
    /// `index + 1 >= buffer length`. The guard checks, the position lookup
    /// and the index rewrite all happen under the buffer lock.
    pub(crate) fn rewind_to(
        &self,
        cursor: &Cursor,
        message_id: Uuid,
    ) -> BusResult<RewindStatus> {
        let entries = self.lock()?;
        if !cursor.committed.load(Ordering::SeqCst) {
            return Ok(RewindStatus::NotCommitted);
        }
        if cursor.index.load(Ordering::SeqCst) + 1 < entries.len() {
            return Ok(RewindStatus::NotCaughtUp);
        }
        match entries.iter().position(|e| e.id == message_id) {
            Some(position) => {
                cursor.index.store(position, Ordering::SeqCst);
                cursor.committed.store(false, Ordering::SeqCst);
                Ok(RewindStatus::Rewound)
            }
            None => Ok(RewindStatus::MessageMissing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::traits::{DeliveryResult, FnSubscriber};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn test_cursor_at(index: usize) -> Arc<Cursor> {
        let handler = Arc::new(FnSubscriber::new(|_, _| Ok(DeliveryResult::Ack)));
        let cursor = Cursor::new(handler, CancellationToken::new());
        cursor.index.store(index, Ordering::SeqCst);
        Arc::new(cursor)
    }

    #[test]
    fn test_append_and_read_in_order() {
        let store = MessageStore::new();

        store.append("first".to_string()).unwrap();
        store.append("second".to_string()).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.read_at(0).unwrap().unwrap().payload, "first");
        assert_eq!(store.read_at(1).unwrap().unwrap().payload, "second");
        assert!(store.read_at(2).unwrap().is_none());
    }

    #[test]
    fn test_find_index_by_id() {
        let store = MessageStore::new();

        let first = store.append("first".to_string()).unwrap();
        let second = store.append("second".to_string()).unwrap();

        assert_eq!(store.find_index_by_id(first).unwrap(), Some(0));
        assert_eq!(store.find_index_by_id(second).unwrap(), Some(1));
        assert_eq!(store.find_index_by_id(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn test_trim_expired_stops_at_first_live_envelope() {
        let store = MessageStore::new();

        store.append("old-1".to_string()).unwrap();
        store.append("old-2".to_string()).unwrap();

        // Everything appended so far is older than a cutoff in the future
        let cutoff = SystemTime::now() + Duration::from_millis(50);
        let removed = store.trim_expired(cutoff, &[]).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_trim_shifts_cursors_atomically_with_floor_zero() {
        let store = MessageStore::new();

        for i in 0..4 {
            store.append(format!("m{}", i)).unwrap();
        }

        let behind = test_cursor_at(1);
        let ahead = test_cursor_at(3);

        let cutoff = SystemTime::now() + Duration::from_millis(50);
        let removed = store
            .trim_expired(cutoff, &[Arc::clone(&behind), Arc::clone(&ahead)])
            .unwrap();

        assert_eq!(removed, 4);
        // max(0, 1 - 4) and max(0, 3 - 4)
        assert_eq!(behind.index.load(Ordering::SeqCst), 0);
        assert_eq!(ahead.index.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trim_with_nothing_expired_is_a_no_op() {
        let store = MessageStore::new();
        store.append("fresh".to_string()).unwrap();

        let cursor = test_cursor_at(1);
        let cutoff = SystemTime::now() - Duration::from_secs(60);
        let removed = store.trim_expired(cutoff, &[Arc::clone(&cursor)]).unwrap();

        assert_eq!(removed, 0);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(cursor.index.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_change_payload_preserves_id_and_timestamp() {
        let store = MessageStore::new();
        let id = store.append("before".to_string()).unwrap();
        let original = store.read_at(0).unwrap().unwrap();

        assert!(store.change_payload(id, "after".to_string()).unwrap());

        let edited = store.read_at(0).unwrap().unwrap();
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.created_at, original.created_at);
        assert_eq!(edited.payload, "after");

        assert!(!store
            .change_payload(Uuid::new_v4(), "nope".to_string())
            .unwrap());
    }

    #[test]
    fn test_next_for_clears_commit_flag_only_when_an_envelope_exists() {
        let store = MessageStore::new();
        let cursor = test_cursor_at(0);

        assert!(store.next_for(&cursor).unwrap().is_none());
        assert!(cursor.committed.load(Ordering::SeqCst));

        store.append("m1".to_string()).unwrap();

        let next = store.next_for(&cursor).unwrap().unwrap();
        assert_eq!(next.payload, "m1");
        assert!(!cursor.committed.load(Ordering::SeqCst));

        store.commit_advance(&cursor).unwrap();
        assert_eq!(cursor.index.load(Ordering::SeqCst), 1);
        assert!(cursor.committed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_rewind_guards() {
        let store = MessageStore::new();
        let m1 = store.append("m1".to_string()).unwrap();
        store.append("m2".to_string()).unwrap();
        store.append("m3".to_string()).unwrap();

        // In-flight cursor is refused
        let in_flight = test_cursor_at(3);
        in_flight.committed.store(false, Ordering::SeqCst);
        assert_eq!(
            store.rewind_to(&in_flight, m1).unwrap(),
            RewindStatus::NotCommitted
        );

        // A cursor that has not caught up is refused
        let lagging = test_cursor_at(1);
        assert_eq!(
            store.rewind_to(&lagging, m1).unwrap(),
            RewindStatus::NotCaughtUp
        );

        // A caught-up, committed cursor rewinds
        let caught_up = test_cursor_at(3);
        assert_eq!(store.rewind_to(&caught_up, m1).unwrap(), RewindStatus::Rewound);
        assert_eq!(caught_up.index.load(Ordering::SeqCst), 0);
        assert!(!caught_up.committed.load(Ordering::SeqCst));

        // Unknown message id leaves the cursor untouched
        let other = test_cursor_at(3);
        assert_eq!(
            store.rewind_to(&other, Uuid::new_v4()).unwrap(),
            RewindStatus::MessageMissing
        );
        assert_eq!(other.index.load(Ordering::SeqCst), 3);
    }
}
