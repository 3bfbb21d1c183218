//! Engine error types

use thiserror::Error;

/// Failures talking to the backend streaming engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// TCP connect to the engine control port failed
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Control-connection I/O failed mid-session
    #[error("control i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Engine rejected the product key
    #[error("authentication rejected")]
    AuthRejected,

    /// Reply line the client could not interpret
    #[error("unexpected reply: {0}")]
    Protocol(String),

    /// Engine reported a failure for the running content
    #[error("engine failure: {0}")]
    Remote(String),

    /// An engine operation did not complete in time
    #[error("timed out")]
    Timeout,

    /// The control connection is gone
    #[error("control connection closed")]
    Closed,
}
