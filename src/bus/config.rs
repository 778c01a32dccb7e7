//! Bus configuration
//!
//! Configuration is immutable after construction. Missing values fall back
//! to documented defaults; values outside the recognized ranges are rejected
//! by [`BusConfig::validate`], which runs during bus construction. Embedding
//! applications typically deserialize this from their own configuration file
//! and hand it to [`MessageBus::new`](crate::bus::MessageBus::new).

use crate::bus::error::{BusError, BusResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum envelope age before the pruner removes it
const DEFAULT_TTL: Duration = Duration::from_secs(30);
/// Default number of retries after the initial delivery attempt
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default pause between delivery attempts
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a [`MessageBus`](crate::bus::MessageBus)
///
/// # Recognized ranges
///
/// | Field | Range | Default |
/// |---|---|---|
/// | `ttl` | > 0 | 30 s |
/// | `retry_count` | 1–100 | 3 |
/// | `retry_delay` | 10 ms – 1000 ms | 100 ms |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum age of an envelope in the buffer before it is pruned
    pub ttl: Duration,
    /// Maximum retries per envelope before the failure handler runs
    pub retry_count: u32,
    /// Pause between delivery attempts for the same envelope
    pub retry_delay: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl BusConfig {
    /// Validate all values against the recognized ranges
    ///
    /// Called by `MessageBus::new`; invalid values fail bus construction.
    pub fn validate(&self) -> BusResult<()> {
        if self.ttl.is_zero() {
            return Err(BusError::Configuration {
                message: "TTL must be greater than zero".to_string(),
            });
        }
        if self.retry_count < 1 || self.retry_count > 100 {
            return Err(BusError::Configuration {
                message: format!(
                    "retry count must be between 1 and 100, got {}",
                    self.retry_count
                ),
            });
        }
        if self.retry_delay < Duration::from_millis(10)
            || self.retry_delay > Duration::from_millis(1000)
        {
            return Err(BusError::Configuration {
                message: format!(
                    "retry delay must be between 10ms and 1000ms, got {:?}",
                    self.retry_delay
                ),
            });
        }
        Ok(())
    }
}
