//! Gateway server
//!
//! Configuration, the constructed process-wide context, and the TCP accept
//! loop that spawns one coordinator task per connection.

pub mod config;
pub mod context;
pub mod listener;

pub use config::{EngineConfig, GatewayConfig, RelayConfig};
pub use context::GatewayContext;
pub use listener::Gateway;
