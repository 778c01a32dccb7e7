//! Generic error handling utilities
//!
//! Provides unified error handling that can work across different error types
//! while maintaining domain-specific error logging patterns.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// This trait enables generic error handling functions to determine whether an error
/// should show specific user messages or generic context with debug details.
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)` with a helpful, actionable message; when it returns `false`,
/// `user_message()` should return `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error contains a specific, user-actionable message
    /// that should be displayed directly to the user
    ///
    /// Examples of user-actionable errors:
    /// - Configuration values outside the recognized ranges
    /// - Subscribing to a bus that has already been disposed
    ///
    /// Examples of system errors:
    /// - Poisoned internal locks
    /// - Background task failures
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<&str>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// - User-actionable errors log their specific message (preserves detail)
/// - System errors log the operation context, keeping internals at debug level
///
/// # Examples
/// ```rust,no_run
/// # use relaybus::core::error_handling::log_error_with_context;
/// # use relaybus::bus::BusError;
/// let err = BusError::Configuration {
///     message: "retry count must be between 1 and 100".to_string(),
/// };
/// log_error_with_context(&err, "Bus construction");
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    if error.is_user_actionable() {
        if let Some(user_msg) = error.user_message() {
            log::error!("{}: {}", operation_context, user_msg);
        } else {
            log::error!("{} failed", operation_context);
        }
    } else {
        log::error!("{} failed", operation_context);
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
