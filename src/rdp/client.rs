//! Typed RPC client traits for the remote debugging protocol
//!
//! The transport (WebSocket framing, message ids, target discovery) is an
//! external collaborator. It exposes `call(method, params)` returning the
//! command's `result` object, and delivers domain notifications back into
//! the adapter.

use crate::config::AttachConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the RDP transport
#[derive(Debug, Clone, Error)]
pub enum RdpError {
    /// The runtime rejected the command
    #[error("{message}")]
    Command {
        /// Error message reported by the runtime
        message: String,
    },

    /// The socket closed while a call was outstanding
    #[error("Connection closed")]
    ConnectionClosed,

    /// Target discovery failed (no target matched, or the endpoint was unreachable)
    #[error("Discovery failed: {message}")]
    Discovery {
        /// Why discovery failed
        message: String,
    },

    /// The call did not complete within the transport's deadline
    #[error("Call timed out: {method}")]
    Timeout {
        /// Method that timed out
        method: String,
    },
}

impl RdpError {
    /// Build a command error from a runtime-reported message
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }
}

/// A live connection to the runtime's debugging endpoint.
#[async_trait]
pub trait RdpConnection: Send + Sync {
    /// Issue a protocol command and await its `result` object.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RdpError>;

    /// Close the underlying socket. Idempotent.
    async fn close(&self);
}

/// Factory for [`RdpConnection`]s.
///
/// Resolves `websocketUrl` directly, or runs target discovery against
/// `address:port` filtered by the configured target URL.
#[async_trait]
pub trait RdpConnector: Send + Sync {
    /// Open a connection for the given attach configuration.
    async fn connect(&self, config: &AttachConfig) -> Result<Arc<dyn RdpConnection>, RdpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RdpError::command("Breakpoint at specified location already exists.");
        assert_eq!(
            err.to_string(),
            "Breakpoint at specified location already exists."
        );
        assert_eq!(
            RdpError::Timeout {
                method: "Debugger.resume".to_string()
            }
            .to_string(),
            "Call timed out: Debugger.resume"
        );
    }
}
