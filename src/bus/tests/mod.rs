//! Test modules for the message bus
//!
//! This module organizes all the test suites for the bus. Tests are split
//! by functional area for better maintainability.

mod retry;

use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Poll a condition until it holds, bounded by `tokio::time::timeout`
///
/// Returns whether the condition held within the budget, so callers can
/// `assert!` on the result instead of hanging on regression.
pub(crate) async fn wait_for(mut condition: impl FnMut() -> bool, budget: Duration) -> bool {
    timeout(budget, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
