//! Bus Error Types

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Message bus has been disposed")]
    Disposed,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl crate::core::error_handling::ContextualError for BusError {
    fn is_user_actionable(&self) -> bool {
        match self {
            BusError::Configuration { .. } => true, // User can fix the config values
            BusError::Disposed => true,             // User can stop using the disposed bus
            BusError::Internal { .. } => false,     // System error
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            BusError::Configuration { message } => Some(message),
            BusError::Disposed => {
                Some("The message bus has been disposed. Create a new bus instance.")
            }
            _ => None,
        }
    }
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;
