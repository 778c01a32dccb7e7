//! Subscriber capability set
//!
//! A subscriber is anything that can receive an envelope, decide what to do
//! when delivery has failed repeatedly, and (reserved for later sweepers)
//! process entries already quarantined in its dead-letter queue. The three
//! capabilities form one trait; simple subscribers only implement
//! [`Subscriber::on_message_receive`] and inherit the defaults.
//!
//! Closure-based subscribers are supported through [`FnSubscriber`], which
//! adapts plain functions into the capability set.

use crate::bus::message::Envelope;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Error type handler implementations may surface
///
/// Wrapped in `Arc` so the retry engine can keep the most recent error and
/// hand it to the failure handler after the final attempt.
pub type HandlerError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The envelope was handled; the cursor advances past it
    Ack,
    /// The envelope was not handled; the retry policy decides what happens next
    Nack,
}

/// Post-failure behavior chosen by the failure handler once retries are exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureBehavior {
    /// Advance past the envelope without quarantining it
    Commit,
    /// Quarantine the envelope in this subscriber's dead-letter queue, then advance
    AddToDlq,
    /// Make one more best-effort delivery attempt (result discarded), then advance
    RetryOnceThenCommit,
    /// Make one more best-effort attempt (result discarded), quarantine, then advance
    RetryOnceThenDlq,
    /// Do not advance; the dispatch loop re-offers the same envelope next iteration
    Block,
}

/// Capability set every subscriber provides
///
/// `on_message_receive` must be safe to invoke many times for the same
/// envelope; returning `Err` is equivalent to returning `Ok(Nack)`.
/// `on_message_failed` runs only after retries are exhausted; returning `Err`
/// from it is treated as choosing [`FailureBehavior::Commit`] so a buggy
/// failure handler cannot halt the subscriber.
///
/// All handler calls receive the cursor's cancellation token and should
/// observe it at their suspension points.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Handle one delivery attempt for an envelope
    async fn on_message_receive(
        &self,
        envelope: &Envelope,
        subscriber_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<DeliveryResult, HandlerError>;

    /// Choose what happens to an envelope after retries are exhausted
    async fn on_message_failed(
        &self,
        _envelope: &Envelope,
        _subscriber_id: Uuid,
        _last_error: Option<&HandlerError>,
        _cancel: &CancellationToken,
    ) -> Result<FailureBehavior, HandlerError> {
        Ok(FailureBehavior::AddToDlq)
    }

    /// Process an envelope already quarantined in the dead-letter queue
    ///
    /// Reserved extension point: the dispatch loop never calls this today,
    /// but DLQ sweepers may.
    async fn on_dead_letter(
        &self,
        _envelope: &Envelope,
        _subscriber_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryResult, HandlerError> {
        Ok(DeliveryResult::Ack)
    }
}

type ReceiveFn =
    dyn Fn(&Envelope, Uuid) -> Result<DeliveryResult, HandlerError> + Send + Sync + 'static;
type FailedFn = dyn Fn(&Envelope, Uuid, Option<&HandlerError>) -> FailureBehavior + Send + Sync + 'static;
type DeadLetterFn = dyn Fn(&Envelope, Uuid) -> DeliveryResult + Send + Sync + 'static;

/// Closure adapter for the subscriber capability set
///
/// Lets a bus be driven with plain functions instead of a trait
/// implementation. Callbacks that are not supplied fall back to the trait
/// defaults: failures quarantine to the DLQ, dead-letter processing acks.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use relaybus::bus::{BusConfig, DeliveryResult, FnSubscriber, MessageBus};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = MessageBus::new(BusConfig::default())?;
/// let subscriber = FnSubscriber::new(|envelope, _id| {
///     println!("got {}", envelope.payload);
///     Ok(DeliveryResult::Ack)
/// });
/// let subscriber_id = bus.subscribe(Arc::new(subscriber))?;
/// # Ok(())
/// # }
/// ```
pub struct FnSubscriber {
    receive: Box<ReceiveFn>,
    failed: Option<Box<FailedFn>>,
    dead_letter: Option<Box<DeadLetterFn>>,
}

impl FnSubscriber {
    /// Create a subscriber from a receive callback
    pub fn new(
        receive: impl Fn(&Envelope, Uuid) -> Result<DeliveryResult, HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            receive: Box::new(receive),
            failed: None,
            dead_letter: None,
        }
    }

    /// Set the failure callback invoked after retries are exhausted
    pub fn on_failed(
        mut self,
        failed: impl Fn(&Envelope, Uuid, Option<&HandlerError>) -> FailureBehavior
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.failed = Some(Box::new(failed));
        self
    }

    /// Set the dead-letter callback for future DLQ sweepers
    pub fn with_dead_letter(
        mut self,
        dead_letter: impl Fn(&Envelope, Uuid) -> DeliveryResult + Send + Sync + 'static,
    ) -> Self {
        self.dead_letter = Some(Box::new(dead_letter));
        self
    }
}

#[async_trait]
impl Subscriber for FnSubscriber {
    async fn on_message_receive(
        &self,
        envelope: &Envelope,
        subscriber_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryResult, HandlerError> {
        (self.receive)(envelope, subscriber_id)
    }

    async fn on_message_failed(
        &self,
        envelope: &Envelope,
        subscriber_id: Uuid,
        last_error: Option<&HandlerError>,
        _cancel: &CancellationToken,
    ) -> Result<FailureBehavior, HandlerError> {
        match &self.failed {
            Some(failed) => Ok(failed(envelope, subscriber_id, last_error)),
            None => Ok(FailureBehavior::AddToDlq),
        }
    }

    async fn on_dead_letter(
        &self,
        envelope: &Envelope,
        subscriber_id: Uuid,
        _cancel: &CancellationToken,
    ) -> Result<DeliveryResult, HandlerError> {
        match &self.dead_letter {
            Some(dead_letter) => Ok(dead_letter(envelope, subscriber_id)),
            None => Ok(DeliveryResult::Ack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_subscriber_forwards_receive_result() {
        let subscriber = FnSubscriber::new(|envelope, _id| {
            if envelope.payload == "good" {
                Ok(DeliveryResult::Ack)
            } else {
                Ok(DeliveryResult::Nack)
            }
        });

        let cancel = CancellationToken::new();
        let id = Uuid::new_v4();

        let good = Envelope::new("good".to_string());
        let bad = Envelope::new("bad".to_string());

        assert_eq!(
            subscriber
                .on_message_receive(&good, id, &cancel)
                .await
                .unwrap(),
            DeliveryResult::Ack
        );
        assert_eq!(
            subscriber
                .on_message_receive(&bad, id, &cancel)
                .await
                .unwrap(),
            DeliveryResult::Nack
        );
    }

    #[tokio::test]
    async fn test_fn_subscriber_default_failure_behavior_is_dlq() {
        let subscriber = FnSubscriber::new(|_, _| Ok(DeliveryResult::Nack));

        let cancel = CancellationToken::new();
        let envelope = Envelope::new("m1".to_string());
        let behavior = subscriber
            .on_message_failed(&envelope, Uuid::new_v4(), None, &cancel)
            .await
            .unwrap();

        assert_eq!(behavior, FailureBehavior::AddToDlq);
    }

    #[tokio::test]
    async fn test_fn_subscriber_dead_letter_callback() {
        let subscriber = FnSubscriber::new(|_, _| Ok(DeliveryResult::Nack))
            .with_dead_letter(|envelope, _| {
                if envelope.payload == "fixable" {
                    DeliveryResult::Ack
                } else {
                    DeliveryResult::Nack
                }
            });

        let cancel = CancellationToken::new();
        let fixable = Envelope::new("fixable".to_string());
        let hopeless = Envelope::new("hopeless".to_string());

        assert_eq!(
            subscriber
                .on_dead_letter(&fixable, Uuid::new_v4(), &cancel)
                .await
                .unwrap(),
            DeliveryResult::Ack
        );
        assert_eq!(
            subscriber
                .on_dead_letter(&hopeless, Uuid::new_v4(), &cancel)
                .await
                .unwrap(),
            DeliveryResult::Nack
        );
    }

    #[tokio::test]
    async fn test_fn_subscriber_custom_failure_behavior() {
        let subscriber = FnSubscriber::new(|_, _| Ok(DeliveryResult::Nack))
            .on_failed(|_, _, _| FailureBehavior::Commit);

        let cancel = CancellationToken::new();
        let envelope = Envelope::new("m1".to_string());
        let behavior = subscriber
            .on_message_failed(&envelope, Uuid::new_v4(), None, &cancel)
            .await
            .unwrap();

        assert_eq!(behavior, FailureBehavior::Commit);
    }
}
