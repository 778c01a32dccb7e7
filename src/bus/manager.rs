//! MessageBus - central coordination for the multi-subscriber bus
//!
//! The MessageBus owns the shared buffer, the subscriber registry, the TTL
//! pruner and the root cancellation token. Producers enqueue through it,
//! subscribers are registered and torn down through it, and all replay and
//! diagnostic operations live here.

use crate::bus::config::BusConfig;
use crate::bus::cursor::Cursor;
use crate::bus::dispatch::spawn_dispatch_loop;
use crate::bus::error::{BusError, BusResult};
use crate::bus::message::Envelope;
use crate::bus::pruner::spawn_pruner;
use crate::bus::state::{BusSnapshot, CursorSnapshot};
use crate::bus::store::{MessageStore, RewindStatus};
use crate::bus::traits::{DeliveryResult, Subscriber};
use crate::bus::{LagStats, MemoryStats};
use crate::core::error_handling::log_error_with_context;
use dashmap::DashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// In-process, push-based, multi-subscriber message bus
///
/// Producers append opaque string payloads to a shared, time-bounded buffer.
/// Each subscriber owns an independent cursor and receives every envelope in
/// enqueue order through its handler, wrapped in the retry/fallback policy.
/// Failed envelopes can be quarantined per subscriber and replayed later.
///
/// # Thread Safety
///
/// The bus is fully thread-safe behind an `Arc<MessageBus>`. Producer calls
/// run on the caller's task; each subscriber gets its own dispatch task; a
/// single background task prunes expired envelopes.
///
/// # Example
///
/// ```rust,no_run
/// use relaybus::bus::{BusConfig, DeliveryResult, FnSubscriber, MessageBus};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = MessageBus::new(BusConfig::default())?;
///
/// let subscriber_id = bus.subscribe(Arc::new(FnSubscriber::new(|envelope, _id| {
///     println!("received: {}", envelope.payload);
///     Ok(DeliveryResult::Ack)
/// })))?;
///
/// bus.enqueue("hello")?;
///
/// // ... later
/// bus.unsubscribe(subscriber_id);
/// bus.dispose();
/// # Ok(())
/// # }
/// ```
pub struct MessageBus {
    config: BusConfig,
    store: Arc<MessageStore>,
    registry: Arc<DashMap<Uuid, Arc<Cursor>>>,
    root_cancel: CancellationToken,
    disposed: AtomicBool,
}

impl MessageBus {
    /// Create a bus and start its TTL pruner
    ///
    /// Fails if the configuration is outside the recognized ranges. Must be
    /// called from within a Tokio runtime; the pruner task is spawned here.
    pub fn new(config: BusConfig) -> BusResult<Arc<Self>> {
        config.validate()?;

        let store = Arc::new(MessageStore::new());
        let registry = Arc::new(DashMap::new());
        let root_cancel = CancellationToken::new();

        spawn_pruner(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.ttl,
            root_cancel.child_token(),
        );

        Ok(Arc::new(Self {
            config,
            store,
            registry,
            root_cancel,
            disposed: AtomicBool::new(false),
        }))
    }

    /// Append a payload to the buffer; returns the new envelope's id
    pub fn enqueue(&self, payload: impl Into<String>) -> BusResult<Uuid> {
        let id = self.store.append(payload.into())?;
        log::trace!("Enqueued envelope {}", id);
        Ok(id)
    }

    /// Register a subscriber and start its dispatch loop
    ///
    /// The new cursor starts at the head of the buffer, so envelopes already
    /// enqueued are delivered before new ones. Fails once the bus has been
    /// disposed.
    pub fn subscribe(&self, handler: Arc<dyn Subscriber>) -> BusResult<Uuid> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(BusError::Disposed);
        }

        let cursor = Arc::new(Cursor::new(handler, self.root_cancel.child_token()));
        let subscriber_id = cursor.id;
        self.registry.insert(subscriber_id, Arc::clone(&cursor));

        // A dispose can slip in between the check above and the insert;
        // re-check so the cleared registry stays cleared
        if self.disposed.load(Ordering::SeqCst) {
            self.registry.remove(&subscriber_id);
            cursor.cancel.cancel();
            return Err(BusError::Disposed);
        }

        spawn_dispatch_loop(Arc::clone(&self.store), cursor, self.config.clone());

        log::debug!("Subscriber {} registered", subscriber_id);
        Ok(subscriber_id)
    }

    /// Cancel a subscriber's dispatch loop and drop its cursor
    ///
    /// Silent no-op (logged at warning) for an unknown id.
    pub fn unsubscribe(&self, subscriber_id: Uuid) {
        match self.registry.remove(&subscriber_id) {
            Some((_, cursor)) => {
                cursor.cancel.cancel();
                log::debug!("Subscriber {} unsubscribed", subscriber_id);
            }
            None => {
                log::warn!("Unsubscribe for unknown subscriber {}", subscriber_id);
            }
        }
    }

    /// Snapshot of the buffer, every live cursor and the configured TTL
    pub fn get_state(&self) -> BusResult<BusSnapshot> {
        let buffer = self.store.snapshot()?;
        let mut subscribers = Vec::with_capacity(self.registry.len());
        for entry in self.registry.iter() {
            subscribers.push(CursorSnapshot::capture(entry.value())?);
        }
        Ok(BusSnapshot {
            buffer,
            subscribers,
            ttl: self.config.ttl,
        })
    }

    /// Edit an envelope's payload in place
    ///
    /// Id and creation timestamp are preserved. Subscribers that already
    /// resolved the envelope do not re-receive it; subscribers that have not
    /// reached it will see the new payload. Silent no-op (logged at warning)
    /// for an unknown id.
    pub fn change_message_payload(
        &self,
        message_id: Uuid,
        payload: impl Into<String>,
    ) -> BusResult<()> {
        if !self.store.change_payload(message_id, payload.into())? {
            log::warn!(
                "ChangeMessagePayload for unknown envelope {}; ignoring",
                message_id
            );
        }
        Ok(())
    }

    /// Re-deliver one dead-letter entry for a subscriber
    ///
    /// Invokes the handler once more; on Ack the entry leaves the DLQ, on
    /// Nack or error the failure handler is informed (mirroring the normal
    /// failure surface) and the entry stays quarantined. Silent no-op for
    /// unknown subscriber or message ids.
    pub async fn replay_from_dlq(&self, subscriber_id: Uuid, message_id: Uuid) -> BusResult<()> {
        let Some(cursor) = self.cursor(subscriber_id) else {
            log::warn!("ReplayFromDlq for unknown subscriber {}", subscriber_id);
            return Ok(());
        };
        Self::replay_one(&cursor, message_id).await
    }

    /// Re-deliver every dead-letter entry for a subscriber, in insertion order
    ///
    /// Entries acked during replay are removed; the iteration works on a
    /// snapshot so removals cannot skip entries.
    pub async fn replay_all_dlq_messages(&self, subscriber_id: Uuid) -> BusResult<()> {
        let Some(cursor) = self.cursor(subscriber_id) else {
            log::warn!(
                "ReplayAllDlqMessages for unknown subscriber {}",
                subscriber_id
            );
            return Ok(());
        };
        Self::replay_all_for(&cursor).await
    }

    /// Fan out DLQ replay to every live subscriber, fire-and-forget
    ///
    /// Each subscriber is replayed on its own task; per-subscriber failures
    /// are logged, never surfaced.
    pub fn replay_all_dlq_subscribers(&self) {
        for entry in self.registry.iter() {
            let cursor = Arc::clone(entry.value());
            tokio::spawn(async move {
                let subscriber_id = cursor.id;
                if let Err(error) = Self::replay_all_for(&cursor).await {
                    log_error_with_context(
                        &error,
                        &format!("DLQ replay for subscriber {}", subscriber_id),
                    );
                }
            });
        }
    }

    /// Rewind a subscriber's cursor to an earlier buffer position
    ///
    /// Permitted only when the subscriber is idle at the tail: committed and
    /// caught up. Any failed guard makes the call a logged no-op. On success
    /// the dispatch loop re-delivers from the rewound position.
    pub fn replay_from(&self, subscriber_id: Uuid, message_id: Uuid) -> BusResult<()> {
        let Some(cursor) = self.cursor(subscriber_id) else {
            log::warn!("ReplayFrom for unknown subscriber {}", subscriber_id);
            return Ok(());
        };
        match self.store.rewind_to(&cursor, message_id)? {
            RewindStatus::Rewound => {
                log::debug!(
                    "Subscriber {} rewound to envelope {}",
                    subscriber_id,
                    message_id
                );
            }
            RewindStatus::NotCommitted => {
                log::warn!(
                    "ReplayFrom refused: subscriber {} has a delivery in flight",
                    subscriber_id
                );
            }
            RewindStatus::NotCaughtUp => {
                log::warn!(
                    "ReplayFrom refused: subscriber {} has not caught up with the buffer tail",
                    subscriber_id
                );
            }
            RewindStatus::MessageMissing => {
                log::warn!(
                    "ReplayFrom: envelope {} is not in the buffer; ignoring",
                    message_id
                );
            }
        }
        Ok(())
    }

    /// Stop every dispatch loop and the pruner
    ///
    /// Idempotent; a second call does nothing. In-flight handlers observe
    /// cancellation at their next suspension point.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.root_cancel.cancel();
        self.registry.clear();
        log::debug!("Message bus disposed");
    }

    /// Lag statistics across all live subscribers
    pub fn lag_stats(&self) -> BusResult<LagStats> {
        let buffer_len = self.store.len()?;
        let lags: Vec<usize> = self
            .registry
            .iter()
            .map(|entry| buffer_len.saturating_sub(entry.value().index.load(Ordering::SeqCst)))
            .collect();

        if lags.is_empty() {
            return Ok(LagStats {
                total_subscribers: 0,
                max_lag: 0,
                min_lag: 0,
                avg_lag: 0.0,
            });
        }

        Ok(LagStats {
            total_subscribers: lags.len(),
            max_lag: *lags.iter().max().expect("non-empty"),
            min_lag: *lags.iter().min().expect("non-empty"),
            avg_lag: lags.iter().sum::<usize>() as f64 / lags.len() as f64,
        })
    }

    /// Approximate memory usage of the buffer
    pub fn memory_stats(&self) -> BusResult<MemoryStats> {
        let buffer = self.store.snapshot()?;
        let payload_bytes: usize = buffer.iter().map(|e| e.payload.len()).sum();
        let overhead_bytes = buffer.len() * mem::size_of::<Envelope>();
        Ok(MemoryStats {
            total_messages: buffer.len(),
            total_bytes: payload_bytes + overhead_bytes,
            payload_bytes,
            overhead_bytes,
        })
    }

    fn cursor(&self, subscriber_id: Uuid) -> Option<Arc<Cursor>> {
        self.registry
            .get(&subscriber_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    async fn replay_one(cursor: &Cursor, message_id: Uuid) -> BusResult<()> {
        let Some(envelope) = cursor.find_dead_letter(message_id)? else {
            log::warn!(
                "ReplayFromDlq: envelope {} is not in subscriber {}'s DLQ",
                message_id,
                cursor.id
            );
            return Ok(());
        };

        cursor.stats.record_attempt();
        match cursor
            .handler
            .on_message_receive(&envelope, cursor.id, &cursor.cancel)
            .await
        {
            Ok(DeliveryResult::Ack) => {
                cursor.stats.record_ack();
                cursor.remove_dead_letter(message_id)?;
                log::debug!(
                    "Envelope {} replayed out of subscriber {}'s DLQ",
                    message_id,
                    cursor.id
                );
            }
            Ok(DeliveryResult::Nack) => {
                let _ = cursor
                    .handler
                    .on_message_failed(&envelope, cursor.id, None, &cursor.cancel)
                    .await;
            }
            Err(error) => {
                let _ = cursor
                    .handler
                    .on_message_failed(&envelope, cursor.id, Some(&error), &cursor.cancel)
                    .await;
            }
        }
        Ok(())
    }

    async fn replay_all_for(cursor: &Cursor) -> BusResult<()> {
        // Iterate a snapshot; replay_one removes acked entries from the live
        // DLQ by id, so removals cannot shift entries under the iteration
        let entries = cursor.dead_letters()?;
        for envelope in entries {
            Self::replay_one(cursor, envelope.id).await?;
        }
        Ok(())
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        self.dispose();
    }
}
