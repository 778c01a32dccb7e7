//! Public API for the message bus
//!
//! This module provides the complete public API for the bus. External
//! modules should import from here rather than directly from internal
//! modules.

// Bus façade and configuration
pub use crate::bus::config::BusConfig;
pub use crate::bus::manager::MessageBus;

// Message types
pub use crate::bus::message::Envelope;

// Subscriber capability set
pub use crate::bus::traits::{
    DeliveryResult, FailureBehavior, FnSubscriber, HandlerError, Subscriber,
};

// Diagnostics
pub use crate::bus::state::{BusSnapshot, CursorSnapshot};
pub use crate::bus::{LagStats, MemoryStats};

// Error handling
pub use crate::bus::error::{BusError, BusResult};
