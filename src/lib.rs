//! # chrome-debug-core
//!
//! Debug Adapter Protocol core for Chrome-style remote debugging targets.
//!
//! The crate speaks DAP toward an IDE and a Chrome-style remote debugging
//! protocol (the `Debugger`, `Runtime` and `Console` domains over a
//! WebSocket) toward a script runtime. It owns the hard middle of that
//! bridge:
//! - the paused/running state machine and stop-reason disambiguation
//! - the breakpoint engine (pending vs committed, hit conditions, the
//!   serialized set/clear queue)
//! - the script registry and skip-file/blackbox engine
//! - variable and scope handle tables with lazy object materialization
//! - stack-trace assembly with async parents and deemphasis hints
//! - the expression evaluation path, including the `.scripts` meta-command
//!
//! Transports and transformers are collaborators: the embedder implements
//! [`rdp::RdpConnector`]/[`rdp::RdpConnection`] for the wire,
//! [`dap::EventSink`] for outgoing DAP events, and the
//! [`transformers`] traits for path and source-map resolution, then
//! forwards every runtime notification into
//! [`adapter::ChromeDebugAdapter::handle_event`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]

pub mod adapter;
pub mod breakpoints;
pub mod config;
pub mod dap;
pub mod error;
pub mod handles;
pub mod pause;
pub mod rdp;
pub mod scripts;
pub mod skip;
pub mod stack;
pub mod transformers;
pub mod variables;

pub use adapter::{AdapterDependencies, ChromeDebugAdapter, THREAD_ID};
pub use config::AttachConfig;
pub use dap::{DapEvent, EventSink, StopReason};
pub use error::{AdapterError, Result};
pub use rdp::{RdpConnection, RdpConnector, RdpError};

/// Crate version information
pub const ADAPTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(!ADAPTER_VERSION.is_empty());
    }
}
