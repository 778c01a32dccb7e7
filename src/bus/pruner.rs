//! TTL pruner task
//!
//! A single long-lived background task started at bus construction. Every
//! interval it computes `now - ttl` and trims expired envelopes from the
//! buffer head, shifting every live cursor in the same locked step so
//! pruning is atomic with respect to cursor arithmetic.
//!
//! Internal failures are logged and the loop continues; only cancellation
//! stops it.

use crate::bus::cursor::Cursor;
use crate::bus::store::MessageStore;
use crate::core::error_handling::log_error_with_context;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const PRUNE_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn spawn_pruner(
    store: Arc<MessageStore>,
    registry: Arc<DashMap<Uuid, Arc<Cursor>>>,
    ttl: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::trace!("Pruner started (ttl {:?})", ttl);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(PRUNE_INTERVAL) => {}
            }

            let Some(cutoff) = SystemTime::now().checked_sub(ttl) else {
                // TTL reaches before the epoch; nothing can be expired yet
                continue;
            };

            let cursors: Vec<Arc<Cursor>> = registry
                .iter()
                .map(|entry| Arc::clone(entry.value()))
                .collect();

            match store.trim_expired(cutoff, &cursors) {
                Ok(0) => {}
                Ok(removed) => {
                    log::debug!("Pruned {} expired envelope(s)", removed);
                }
                Err(error) => {
                    // Logged and swallowed; only cancellation stops the loop
                    log_error_with_context(&error, "Pruner iteration");
                }
            }
        }
        log::trace!("Pruner stopped");
    })
}
