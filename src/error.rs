//! Error types for CEL engine operations

use thiserror::Error;

/// Result type alias for CEL operations
pub type CelResult<T> = Result<T, CelError>;

/// Error types surfaced by the CEL engine
#[derive(Error, Debug)]
pub enum CelError {
    /// Configuration failed validation; the previous configuration is kept
    #[error("Configuration rejected: {reason}")]
    ConfigRejected { reason: String },

    /// Event name not recognized during config parsing or lookup
    #[error("Unknown CEL event name: {name}")]
    UnknownEventName { name: String },

    /// Backend registration with an empty name
    #[error("Backend name must not be empty")]
    EmptyBackendName,

    /// Unregister for a name that was never registered
    #[error("No backend registered under name: {name}")]
    BackendNotFound { name: String },

    /// Extras serialization failed
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CelError {
    /// Create a config rejection with a custom reason
    pub fn config_rejected(reason: impl Into<String>) -> Self {
        Self::ConfigRejected {
            reason: reason.into(),
        }
    }

    /// Create an unknown-event-name error
    pub fn unknown_event(name: impl Into<String>) -> Self {
        Self::UnknownEventName { name: name.into() }
    }

    /// Check if this error came from configuration handling.
    ///
    /// Reload callers use this to decide whether the prior configuration
    /// was retained (it always is for config errors).
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CelError::ConfigRejected { .. } | CelError::UnknownEventName { .. }
        )
    }
}
