//! Retry / fallback policy engine
//!
//! Wraps a single envelope delivery with bounded retries, then routes
//! exhausted failures through the subscriber's failure handler. The engine
//! never touches the cursor itself; it reports a [`Disposition`] and the
//! dispatch loop applies it under the store lock.

use crate::bus::config::BusConfig;
use crate::bus::cursor::DeliveryStats;
use crate::bus::message::Envelope;
use crate::bus::traits::{DeliveryResult, FailureBehavior, HandlerError, Subscriber};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What the dispatch loop should do with the envelope after the engine ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Advance the cursor past this envelope
    Commit,
    /// Append the envelope to the subscriber's DLQ, then advance
    CommitToDlq,
    /// Leave the cursor in place; the same envelope is re-offered next iteration
    Block,
}

/// Deliver one envelope through the retry and fallback policy
///
/// Calls `on_message_receive` at most `1 + retry_count` times, pausing
/// `retry_delay` between attempts. A handler error counts as a Nack. Once
/// attempts are exhausted the failure handler chooses the post-failure
/// behavior; if the failure handler itself errors, the choice degrades to
/// Commit so a buggy failure handler cannot halt the subscriber. The
/// RetryOnce variants make one extra best-effort receive call whose outcome
/// is discarded.
///
/// Cancellation short-circuits to Block: the dispatch loop observes the
/// token and exits without resolving the envelope.
pub(crate) async fn deliver_with_policy(
    handler: &Arc<dyn Subscriber>,
    envelope: &Envelope,
    subscriber_id: Uuid,
    config: &BusConfig,
    cancel: &CancellationToken,
    stats: &DeliveryStats,
) -> Disposition {
    let max_attempts = 1 + config.retry_count as usize;
    let mut last_error: Option<HandlerError> = None;

    for attempt in 0..max_attempts {
        if cancel.is_cancelled() {
            return Disposition::Block;
        }

        stats.record_attempt();
        match handler
            .on_message_receive(envelope, subscriber_id, cancel)
            .await
        {
            Ok(DeliveryResult::Ack) => {
                stats.record_ack();
                return Disposition::Commit;
            }
            Ok(DeliveryResult::Nack) => {
                last_error = None;
            }
            Err(error) => {
                log::debug!(
                    "Handler error for envelope {} (subscriber {}, attempt {}/{}): {}",
                    envelope.id,
                    subscriber_id,
                    attempt + 1,
                    max_attempts,
                    error
                );
                last_error = Some(error);
            }
        }

        if attempt + 1 < max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return Disposition::Block,
                _ = sleep(config.retry_delay) => {}
            }
        }
    }

    log::warn!(
        "Delivery of envelope {} to subscriber {} failed after {} attempts",
        envelope.id,
        subscriber_id,
        max_attempts
    );

    let behavior = match handler
        .on_message_failed(envelope, subscriber_id, last_error.as_ref(), cancel)
        .await
    {
        Ok(behavior) => behavior,
        Err(error) => {
            // A failing failure handler must not halt the subscriber
            log::warn!(
                "Failure handler for subscriber {} errored ({}); committing envelope {}",
                subscriber_id,
                error,
                envelope.id
            );
            FailureBehavior::Commit
        }
    };

    match behavior {
        FailureBehavior::Commit => Disposition::Commit,
        FailureBehavior::AddToDlq => Disposition::CommitToDlq,
        FailureBehavior::RetryOnceThenCommit => {
            stats.record_attempt();
            let _ = handler
                .on_message_receive(envelope, subscriber_id, cancel)
                .await;
            Disposition::Commit
        }
        FailureBehavior::RetryOnceThenDlq => {
            stats.record_attempt();
            let _ = handler
                .on_message_receive(envelope, subscriber_id, cancel)
                .await;
            Disposition::CommitToDlq
        }
        FailureBehavior::Block => Disposition::Block,
    }
}
