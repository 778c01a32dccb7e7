//! Tests for retry exhaustion, attempt bounds and blocking behavior

#[cfg(test)]
mod tests {
    use crate::bus::api::{
        BusConfig, DeliveryResult, FailureBehavior, FnSubscriber, MessageBus,
    };
    use crate::bus::tests::wait_for;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config(retry_count: u32) -> BusConfig {
        BusConfig {
            ttl: Duration::from_secs(300),
            retry_count,
            retry_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_nack_then_commit_uses_exactly_one_plus_retry_count_attempts() {
        let bus = MessageBus::new(fast_config(3)).unwrap();
        bus.enqueue("m1").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let subscriber = FnSubscriber::new(move |_, _| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryResult::Nack)
        })
        .on_failed(|_, _, _| FailureBehavior::Commit);

        let subscriber_id = bus.subscribe(Arc::new(subscriber)).unwrap();

        let state_bus = Arc::clone(&bus);
        assert!(
            wait_for(
                move || {
                    let state = state_bus.get_state().unwrap();
                    state
                        .subscriber(subscriber_id)
                        .map(|s| s.index == 1)
                        .unwrap_or(false)
                },
                Duration::from_secs(1),
            )
            .await
        );

        assert_eq!(calls.load(Ordering::SeqCst), 4, "1 initial + 3 retries");

        let state = bus.get_state().unwrap();
        let cursor = state.subscriber(subscriber_id).unwrap();
        assert_eq!(cursor.index, 1);
        assert!(cursor.dead_letters.is_empty());
    }

    #[tokio::test]
    async fn test_retry_once_then_commit_bounds_attempts() {
        let bus = MessageBus::new(fast_config(2)).unwrap();
        bus.enqueue("m1").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let subscriber = FnSubscriber::new(move |_, _| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryResult::Nack)
        })
        .on_failed(|_, _, _| FailureBehavior::RetryOnceThenCommit);

        let subscriber_id = bus.subscribe(Arc::new(subscriber)).unwrap();

        let state_bus = Arc::clone(&bus);
        assert!(
            wait_for(
                move || {
                    let state = state_bus.get_state().unwrap();
                    state
                        .subscriber(subscriber_id)
                        .map(|s| s.index == 1)
                        .unwrap_or(false)
                },
                Duration::from_secs(1),
            )
            .await
        );

        // 1 initial + 2 retries + 1 best-effort extra, never more
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let state = bus.get_state().unwrap();
        assert!(state
            .subscriber(subscriber_id)
            .unwrap()
            .dead_letters
            .is_empty());
    }

    #[tokio::test]
    async fn test_block_re_offers_the_same_envelope() {
        let bus = MessageBus::new(fast_config(1)).unwrap();
        bus.enqueue("stuck").unwrap();
        bus.enqueue("next").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let subscriber = FnSubscriber::new(move |_, _| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            Ok(DeliveryResult::Nack)
        })
        .on_failed(|_, _, _| FailureBehavior::Block);

        let subscriber_id = bus.subscribe(Arc::new(subscriber)).unwrap();

        // At least two full attempt cycles (2 attempts each) on the same envelope
        let calls_in_wait = Arc::clone(&calls);
        assert!(
            wait_for(
                move || calls_in_wait.load(Ordering::SeqCst) >= 4,
                Duration::from_secs(2),
            )
            .await
        );

        let state = bus.get_state().unwrap();
        let cursor = state.subscriber(subscriber_id).unwrap();
        assert_eq!(cursor.index, 0, "a blocked cursor must not advance");
        assert!(!cursor.committed);
        assert!(cursor.dead_letters.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_counts_as_nack() {
        let bus = MessageBus::new(fast_config(2)).unwrap();
        bus.enqueue("m1").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = Arc::clone(&calls);
        let subscriber = FnSubscriber::new(move |_, _| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            Err(Arc::new(std::io::Error::other("boom")) as crate::bus::HandlerError)
        })
        .on_failed(|_, _, last_error| {
            assert!(last_error.is_some(), "the engine must hand over the last error");
            FailureBehavior::Commit
        });

        let subscriber_id = bus.subscribe(Arc::new(subscriber)).unwrap();

        let state_bus = Arc::clone(&bus);
        assert!(
            wait_for(
                move || {
                    let state = state_bus.get_state().unwrap();
                    state
                        .subscriber(subscriber_id)
                        .map(|s| s.index == 1)
                        .unwrap_or(false)
                },
                Duration::from_secs(1),
            )
            .await
        );

        assert_eq!(calls.load(Ordering::SeqCst), 3, "1 initial + 2 retries");
    }
}
