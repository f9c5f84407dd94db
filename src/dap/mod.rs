//! IDE-facing Debug Adapter Protocol surface
//!
//! Request/response body types and the event sink the embedding DAP
//! transport implements. Request dispatch and message sequencing live in
//! the transport; the adapter receives typed arguments and returns typed
//! bodies.

pub mod events;
pub mod types;

pub use events::{DapEvent, EventSink, StopReason};
