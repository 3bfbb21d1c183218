//! Stream pump
//!
//! Copies the origin response to the client socket chunk by chunk until the
//! origin ends, the client vanishes, or the hang watcher aborts the task.
//! Every failure in here is expected churn — mark the connection dead and
//! return, never escalate.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;

use crate::engine::{EngineError, EngineSession};
use crate::relay::RelayController;
use crate::session::state::ClientFlags;

/// Poll interval for engine play events when driving the relay
const RELAY_EVENT_POLL: Duration = Duration::from_millis(500);

/// Playback-obey coordination
///
/// Direct mode blocks on the engine's play event before each chunk. Relay
/// mode polls the event with a short timeout and pauses/resumes the
/// broadcast on the edges; `playing` is the cached belief about the relay's
/// state so commands are only sent on transitions.
pub struct PlaybackGate {
    session: Arc<dyn EngineSession>,
    relay: Option<(Arc<dyn RelayController>, String)>,
    playing: bool,
}

impl PlaybackGate {
    /// Gate for a direct (non-relay) stream
    pub fn direct(session: Arc<dyn EngineSession>) -> Self {
        Self {
            session,
            relay: None,
            playing: true,
        }
    }

    /// Gate that pauses/resumes a relay broadcast
    pub fn relayed(
        session: Arc<dyn EngineSession>,
        relay: Arc<dyn RelayController>,
        broadcast_id: String,
    ) -> Self {
        Self {
            session,
            relay: Some((relay, broadcast_id)),
            playing: true,
        }
    }

    /// Wait for playback, driving the relay on state edges
    ///
    /// An error means the engine session is gone and the pump should stop.
    async fn synchronize(&mut self) -> Result<(), EngineError> {
        match &self.relay {
            None => self.session.wait_play_event(None).await,
            Some((relay, id)) => match self.session.wait_play_event(Some(RELAY_EVENT_POLL)).await {
                Ok(()) => {
                    if !self.playing {
                        if let Err(e) = relay.unpause_broadcast(id).await {
                            tracing::debug!(broadcast = %id, error = %e, "unpause failed");
                        }
                        self.playing = true;
                    }
                    Ok(())
                }
                Err(EngineError::Timeout) => {
                    if self.playing {
                        if let Err(e) = relay.pause_broadcast(id).await {
                            tracing::debug!(broadcast = %id, error = %e, "pause failed");
                        }
                        self.playing = false;
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
        }
    }
}

/// Everything the pump task owns
pub struct StreamPump {
    pub origin: reqwest::Response,
    pub writer: OwnedWriteHalf,
    pub flags: Arc<ClientFlags>,
    pub gate: Option<PlaybackGate>,
}

/// Run the pump until either side is done
pub async fn run(mut pump: StreamPump) {
    tracing::debug!("pump started");
    loop {
        if let Some(gate) = pump.gate.as_mut() {
            if let Err(e) = gate.synchronize().await {
                tracing::debug!(error = %e, "playback gate closed");
                break;
            }
        }

        if !pump.flags.connected() {
            tracing::debug!("client no longer connected, pump terminating");
            break;
        }

        match pump.origin.chunk().await {
            Ok(Some(data)) => {
                if let Err(e) = pump.writer.write_all(&data).await {
                    tracing::debug!(error = %e, "client write failed");
                    pump.flags.mark_disconnected();
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("origin stream ended");
                break;
            }
            Err(e) => {
                // Origin connection dropped; expected churn.
                tracing::debug!(error = %e, "origin read failed");
                pump.flags.mark_disconnected();
                break;
            }
        }
    }
    let _ = pump.writer.flush().await;
}
