//! Multi-Subscriber Message Bus Component
//!
//! An in-process, push-based message bus with independent per-subscriber
//! progress, bounded delivery retries, per-subscriber dead-letter
//! quarantine, TTL-based buffer pruning and replay.
//!
//! # Overview
//!
//! Producers append opaque string payloads to a single shared buffer. Every
//! subscriber owns a cursor into that buffer and receives each envelope in
//! enqueue order through its handler. Key features:
//!
//! - **Multiple Producers**: any number of tasks can enqueue concurrently
//! - **Independent Subscribers**: each cursor advances at its own pace
//! - **Retry Policy**: bounded retries with a configurable pause, then a
//!   subscriber-chosen fallback (commit, quarantine, extra attempt, block)
//! - **Dead-Letter Queues**: per-subscriber quarantine with targeted replay
//! - **TTL Pruning**: a background task trims expired envelopes and shifts
//!   cursors atomically so no subscriber observes an out-of-range position
//! - **Replay**: rewind an idle cursor to an earlier buffer position
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Producer A  │     │  Producer B  │     │  Producer C  │
//! └──────┬───────┘     └──────┬───────┘     └──────┬───────┘
//!        │ enqueue            │ enqueue            │ enqueue
//!        ▼                    ▼                    ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                       MessageBus                        │
//! │  ┌─────────────────────────────────────────────────┐    │
//! │  │        shared buffer (TTL-pruned at head)       │    │
//! │  │  ┌───┬───┬───┬───┬───┬───┬───┬───┬───┬───┐     │    │
//! │  │  │ 0 │ 1 │ 2 │ 3 │ 4 │ 5 │ 6 │ 7 │ 8 │...│     │    │
//! │  │  └───┴───┴───┴───┴───┴───┴───┴───┴───┴───┘     │    │
//! │  │     ▲       ▲           ▲                       │    │
//! │  └─────┼───────┼───────────┼───────────────────────┘    │
//! └────────┼───────┼───────────┼────────────────────────────┘
//!          │ deliver│ deliver  │ deliver
//! ┌────────┴──┐ ┌──┴───────┐ ┌─┴────────┐
//! │ Cursor A  │ │ Cursor B │ │ Cursor C │  (independent positions,
//! │ + DLQ     │ │ + DLQ    │ │ + DLQ    │   private dead-letter queues)
//! └───────────┘ └──────────┘ └──────────┘
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use relaybus::bus::{BusConfig, DeliveryResult, FnSubscriber, MessageBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = MessageBus::new(BusConfig::default())?;
//!
//! // Subscribe a handler; envelopes arrive in enqueue order
//! let subscriber_id = bus.subscribe(Arc::new(FnSubscriber::new(|envelope, _id| {
//!     println!("processing {}", envelope.payload);
//!     Ok(DeliveryResult::Ack)
//! })))?;
//!
//! // Producers enqueue from any task
//! bus.enqueue("first")?;
//! bus.enqueue("second")?;
//!
//! // Inspect progress
//! let state = bus.get_state()?;
//! println!("{} envelope(s) buffered", state.buffer.len());
//!
//! bus.unsubscribe(subscriber_id);
//! bus.dispose();
//! # Ok(())
//! # }
//! ```

pub mod api;
mod config;
mod cursor;
mod dispatch;
mod error;
mod manager;
mod message;
mod policy;
mod pruner;
mod state;
mod store;
mod traits;

pub use config::BusConfig;
pub use error::{BusError, BusResult};
pub use manager::MessageBus;
pub use message::Envelope;
pub use state::{BusSnapshot, CursorSnapshot};
pub use traits::{DeliveryResult, FailureBehavior, FnSubscriber, HandlerError, Subscriber};

use serde::Serialize;

/// Memory usage statistics for the bus buffer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    /// Total number of envelopes in the buffer
    pub total_messages: usize,
    /// Total memory usage in bytes
    pub total_bytes: usize,
    /// Memory used by payload data
    pub payload_bytes: usize,
    /// Memory used by envelope metadata
    pub overhead_bytes: usize,
}

/// Subscriber lag statistics for the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagStats {
    /// Total number of live subscribers
    pub total_subscribers: usize,
    /// Maximum lag among all subscribers
    pub max_lag: usize,
    /// Minimum lag among all subscribers
    pub min_lag: usize,
    /// Average lag across all subscribers
    pub avg_lag: f64,
}

#[cfg(test)]
mod tests;
