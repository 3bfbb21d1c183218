//! Backend engine collaborator
//!
//! The engine is consumed strictly through the trait seam here: a backend
//! that opens sessions, and a session that starts content, resolves the
//! playable URL, reports playback events, and is destroyed when the last
//! client leaves. The gateway core never sees the wire protocol — the
//! registry stores sessions as `Arc<dyn EngineSession>`, and tests swap in
//! fakes.

pub mod client;
pub mod error;
pub mod protocol;

pub use client::TcpEngineBackend;
pub use error::EngineError;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::session::request::{RequestKind, StreamRequest};

/// Content-start command for one session
///
/// The positional request parameters map onto the torrent start options in
/// order; absent ones arrive as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRequest {
    /// Start by direct content identifier
    Pid {
        content_id: String,
        file_indexes: i64,
    },
    /// Start by torrent URL
    Torrent {
        url: String,
        file_indexes: i64,
        developer_id: i64,
        affiliate_id: i64,
        zone_id: i64,
        stream_id: i64,
    },
}

impl StartRequest {
    /// Build the start command for a parsed stream request
    pub fn for_stream(request: &StreamRequest) -> Self {
        let p = &request.params;
        match request.kind {
            RequestKind::Pid => StartRequest::Pid {
                content_id: request.payload.clone(),
                file_indexes: p[0],
            },
            RequestKind::Torrent => StartRequest::Torrent {
                url: request.payload.clone(),
                file_indexes: p[0],
                developer_id: p[1],
                affiliate_id: p[2],
                zone_id: p[3],
                stream_id: p[4],
            },
        }
    }
}

/// One live engine session
///
/// Sessions are shared between connections through the registry; every
/// method takes `&self` and is safe to call concurrently. `destroy` is
/// idempotent — the teardown race between two grace-period sleepers makes a
/// second call possible.
#[async_trait]
pub trait EngineSession: Send + Sync + std::fmt::Debug {
    /// Issue the content-start command
    async fn start(&self, request: &StartRequest) -> Result<(), EngineError>;

    /// Wait for the playable URL, up to `timeout`
    async fn stream_url(&self, timeout: Duration) -> Result<String, EngineError>;

    /// Wait for the engine to report playback
    ///
    /// `None` waits indefinitely; `Some(t)` fails with [`EngineError::Timeout`]
    /// when no play event arrives within `t`.
    async fn wait_play_event(&self, timeout: Option<Duration>) -> Result<(), EngineError>;

    /// Tear the session down on the engine side
    async fn destroy(&self);
}

/// Opens engine sessions
///
/// Connects the control channel and runs the initialization handshake; the
/// returned session is ready for [`EngineSession::start`].
#[async_trait]
pub trait EngineBackend: Send + Sync {
    async fn open_session(&self) -> Result<Arc<dyn EngineSession>, EngineError>;
}
