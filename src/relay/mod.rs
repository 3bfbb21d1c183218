//! Broadcast relay collaborator
//!
//! The relay fans one upstream stream out to many downstream HTTP clients.
//! The gateway drives it through this trait seam: start/stop a broadcast
//! under a deterministic ID, pause and resume it in lockstep with engine
//! playback events, and build the URL clients are redirected to. Tests swap
//! in a recording fake.

pub mod client;
pub mod error;

pub use client::VlmRelay;
pub use error::RelayError;

use async_trait::async_trait;

/// Control surface of the broadcast relay
#[async_trait]
pub trait RelayController: Send + Sync {
    /// Start broadcasting `input` under `id`
    async fn start_broadcast(
        &self,
        id: &str,
        input: &str,
        mux: &str,
        pre_access: Option<&str>,
    ) -> Result<(), RelayError>;

    /// Stop and remove the broadcast
    async fn stop_broadcast(&self, id: &str) -> Result<(), RelayError>;

    /// Pause the running broadcast
    async fn pause_broadcast(&self, id: &str) -> Result<(), RelayError>;

    /// Resume a paused broadcast
    async fn unpause_broadcast(&self, id: &str) -> Result<(), RelayError>;

    /// URL the relay publishes this broadcast on
    fn published_url(&self, id: &str) -> String;
}
