//! Runtime-facing remote debugging protocol
//!
//! Wire types for the `Debugger`, `Runtime` and `Console` domains, and the
//! transport-facing client traits. The WebSocket transport itself lives
//! outside this crate; it hands the adapter a connected [`client::RdpConnection`]
//! and forwards every domain notification into the adapter's event dispatch.

pub mod client;
pub mod types;

pub use client::{RdpConnection, RdpConnector, RdpError};
