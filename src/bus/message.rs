//! Envelope type carried by the message bus
//!
//! An envelope wraps an opaque string payload with the metadata the bus
//! assigns on enqueue: a globally unique id and a wall-clock creation
//! timestamp. The id and timestamp never change; the payload may be edited
//! in place through the bus façade.

use serde::Serialize;
use std::time::SystemTime;
use uuid::Uuid;

/// A payload plus its immutable bus-assigned metadata
///
/// Envelopes are created by [`MessageBus::enqueue`](crate::bus::MessageBus::enqueue)
/// and removed from the buffer when their age exceeds the configured TTL.
/// Payloads are opaque to the bus; subscribers interpret them.
///
/// # Example
///
/// ```rust,no_run
/// # use relaybus::bus::{BusConfig, MessageBus};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = MessageBus::new(BusConfig::default())?;
/// let id = bus.enqueue("order-created:4711")?;
/// println!("enqueued envelope {id}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Globally unique envelope id, assigned on enqueue
    pub id: Uuid,
    /// Wall-clock timestamp taken when the envelope was appended
    pub created_at: SystemTime,
    /// Opaque application payload
    pub payload: String,
}

impl Envelope {
    pub(crate) fn new(payload: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: SystemTime::now(),
            payload,
        }
    }
}
