//! Per-connection request handling
//!
//! One task per accepted connection runs the coordinator state machine:
//! validate, register with the session registry, create or join the engine
//! session, resolve the playable URL, optionally bridge the broadcast
//! relay, then stream. During streaming two sibling tasks race — the pump
//! copying origin bytes to the client and the hang watcher detecting
//! client disconnects — and whichever finishes first cancels the other.

pub mod coordinator;
pub mod hang;
pub mod pump;
pub mod request;
pub mod state;

pub use request::{RequestKind, StreamRequest};
pub use state::{ClientFlags, ConnectionState};
