//! Per-connection state
//!
//! `ConnectionState` is owned by the handling task and never shared. The
//! small exception is `ClientFlags`: the pump and the hang watcher both
//! need the connected/headers-sent bits, so those live behind an `Arc` with
//! atomic access.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::request::StreamRequest;

/// Connection bits shared with the pump and hang watcher
#[derive(Debug)]
pub struct ClientFlags {
    connected: AtomicBool,
    headers_sent: AtomicBool,
}

impl ClientFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            headers_sent: AtomicBool::new(false),
        })
    }

    /// Whether the client is still believed connected
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Record a detected client disconnect; idempotent
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Whether response headers already went out
    pub fn headers_sent(&self) -> bool {
        self.headers_sent.load(Ordering::Acquire)
    }

    /// Record that response headers went out
    pub fn mark_headers_sent(&self) {
        self.headers_sent.store(true, Ordering::Release);
    }
}

/// Mutable context for one request
pub struct ConnectionState {
    /// Monotonic id assigned by the listener, for log correlation
    pub session_id: u64,
    /// Remote peer; the IP is the registry attachment identity
    pub peer: SocketAddr,
    /// The validated request
    pub request: StreamRequest,
    /// Playable URL once resolved
    pub resolved_url: Option<String>,
    /// Starts true so an early abort skips the destroy grace period; the
    /// coordinator clears it once the URL resolves and re-sets it on any
    /// surfaced failure after that.
    pub error_occurred: bool,
    /// Bits shared with the pump/hang tasks
    pub flags: Arc<ClientFlags>,
}

impl ConnectionState {
    pub fn new(session_id: u64, peer: SocketAddr, request: StreamRequest) -> Self {
        Self {
            session_id,
            peer,
            request,
            resolved_url: None,
            error_occurred: true,
            flags: ClientFlags::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_default_connected() {
        let flags = ClientFlags::new();
        assert!(flags.connected());
        assert!(!flags.headers_sent());

        flags.mark_disconnected();
        flags.mark_disconnected();
        assert!(!flags.connected());

        flags.mark_headers_sent();
        assert!(flags.headers_sent());
    }
}
