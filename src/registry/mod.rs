//! Shared session registry
//!
//! The registry is the one piece of state mutated by every connection task:
//! a map from content key to the engine session serving that content plus
//! the clients currently attached to it. It gates session creation (exactly
//! one attacher per key becomes the creator, even under a concurrent attach
//! storm) and session destruction (the entry outlives its last client so
//! the grace-period re-check can observe a racing reconnect).
//!
//! # Architecture
//!
//! ```text
//!                     SessionRegistry
//!               ┌──────────────────────────┐
//!               │ entries: HashMap<        │
//!               │   ContentKey,            │
//!               │   SessionEntry {         │
//!               │     handoff: watch::Tx,  │  Pending → Ready(session)
//!               │     clients: Vec<IpAddr> │           ↘ Failed
//!               │   }                      │
//!               │ >                        │
//!               └────────────┬─────────────┘
//!                            │ one Mutex, never held across awaits
//!          ┌─────────────────┼─────────────────┐
//!          ▼                 ▼                 ▼
//!     [creator]          [joiner]          [joiner]
//!     open+start      rx.changed()      rx.changed()
//!          │                 ▲                 ▲
//!          └── set_session ──┴─────────────────┘
//! ```

pub mod entry;
pub mod store;

pub use entry::{ContentKey, SessionEntry, SessionHandoff};
pub use store::{AttachRole, Attachment, SessionRegistry};
