//! Synchronization utilities for robust mutex handling
//!
//! This module provides utilities for handling mutex poisoning and other
//! synchronization concerns in a consistent manner across the codebase.

use std::sync::LockResult;

/// Handle poisoned lock cases with consistent error handling
///
/// Converts lock poison errors into application-specific errors using a
/// provided error constructor. A poisoned lock means a panic occurred while
/// the lock was held; the bus treats that as a system error rather than
/// propagating the panic into every caller.
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use relaybus::core::sync::handle_lock_poison;
/// use relaybus::bus::BusError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_lock_poison(
///     mutex.lock(),
///     |msg| BusError::Internal { message: msg }
/// ).unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_lock_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (lock poisoned). This indicates a panic occurred while holding a lock. PoisonError: {:?}",
            poison_err
        ))
    })
}
