//! Per-subscriber dispatch loop
//!
//! One loop runs per subscription, spawned on subscribe and terminated by
//! the cursor's cancellation token. Each iteration reads the envelope at the
//! cursor position, delivers it through the policy engine and applies the
//! resulting disposition. Loops never interact with each other; every
//! subscriber makes progress at its own pace.

use crate::bus::config::BusConfig;
use crate::bus::cursor::Cursor;
use crate::bus::error::BusResult;
use crate::bus::message::Envelope;
use crate::bus::policy::{deliver_with_policy, Disposition};
use crate::bus::store::MessageStore;
use crate::core::error_handling::log_error_with_context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Pause while the cursor is caught up, and after a blocked delivery cycle
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub(crate) fn spawn_dispatch_loop(
    store: Arc<MessageStore>,
    cursor: Arc<Cursor>,
    config: BusConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::trace!("Dispatch loop started for subscriber {}", cursor.id);
        run_dispatch_loop(store, cursor, config).await;
    })
}

async fn run_dispatch_loop(store: Arc<MessageStore>, cursor: Arc<Cursor>, config: BusConfig) {
    loop {
        if cursor.cancel.is_cancelled() {
            break;
        }

        let next = match store.next_for(&cursor) {
            Ok(next) => next,
            Err(error) => {
                log_error_with_context(
                    &error,
                    &format!("Store read for subscriber {}", cursor.id),
                );
                break;
            }
        };

        let Some(envelope) = next else {
            // Caught up; wait for new envelopes or cancellation
            tokio::select! {
                _ = cursor.cancel.cancelled() => break,
                _ = sleep(IDLE_POLL_INTERVAL) => continue,
            }
        };

        let disposition = deliver_with_policy(
            &cursor.handler,
            &envelope,
            cursor.id,
            &config,
            &cursor.cancel,
            &cursor.stats,
        )
        .await;

        let applied = apply_disposition(&store, &cursor, envelope, disposition);
        if let Err(error) = applied {
            log_error_with_context(
                &error,
                &format!("Cursor update for subscriber {}", cursor.id),
            );
            break;
        }

        if disposition == Disposition::Block {
            // Re-offer the same envelope next iteration, with a pause so a
            // permanently blocked subscriber does not busy-spin
            tokio::select! {
                _ = cursor.cancel.cancelled() => break,
                _ = sleep(IDLE_POLL_INTERVAL) => {}
            }
        }
    }
    log::trace!("Dispatch loop stopped for subscriber {}", cursor.id);
}

fn apply_disposition(
    store: &MessageStore,
    cursor: &Cursor,
    envelope: Envelope,
    disposition: Disposition,
) -> BusResult<()> {
    match disposition {
        Disposition::Commit => store.commit_advance(cursor),
        Disposition::CommitToDlq => {
            cursor.push_dead_letter(envelope)?;
            store.commit_advance(cursor)
        }
        Disposition::Block => Ok(()),
    }
}
