//! Error types for adapter operations
//!
//! Request-level failures are returned to the DAP caller with a displayable
//! message; event-driven failures are logged and swallowed so the session
//! continues.

use thiserror::Error;

/// Result type alias for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Error type for adapter operations
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Request arguments failed validation
    #[error("{message}")]
    Validation {
        /// Displayable reason
        message: String,
    },

    /// A stepping or evaluation call arrived before attach completed
    #[error("Runtime is not connected")]
    NotConnected,

    /// Unknown thread id (the adapter exposes exactly one thread, id 1)
    #[error("Invalid thread id: {id}")]
    InvalidThread {
        /// Thread id that was requested
        id: i64,
    },

    /// A frame or variable handle from a previous pause epoch, or never issued
    #[error("Unknown handle: {handle}")]
    UnknownHandle {
        /// The handle that failed to resolve
        handle: i64,
    },

    /// Bad `sourceReference` in a source or breakpoint request
    #[error("Invalid source reference: {reference}")]
    InvalidSourceReference {
        /// The offending reference
        reference: i64,
    },

    /// Stack operations require a current paused notification
    #[error("No call stack available")]
    NoCallStack,

    /// A breakpoint could not be mapped to a loaded script
    #[error("Unresolvable breakpoint: {message}")]
    UnresolvableBreakpoint {
        /// Why resolution failed
        message: String,
    },

    /// The runtime reported `exceptionDetails` for an evaluation
    #[error("{message}")]
    Evaluation {
        /// Extracted error text
        message: String,
    },

    /// Transport-level RDP failure
    #[error("Runtime error: {0}")]
    Rdp(#[from] crate::rdp::client::RdpError),

    /// Malformed request or response payload
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdapterError {
    /// Build a validation error from a displayable message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build an unresolvable-breakpoint error
    pub fn unresolvable(message: impl Into<String>) -> Self {
        Self::UnresolvableBreakpoint {
            message: message.into(),
        }
    }

    /// Build an evaluation error from extracted exception text
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }
}
