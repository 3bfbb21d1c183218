//! Relay error types

use thiserror::Error;

/// Failures talking to the broadcast relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// TCP connect to the relay control port failed
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Control-connection I/O failed
    #[error("control i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Relay rejected the configured password
    #[error("authentication rejected")]
    AuthRejected,

    /// Relay answered a command with an error
    #[error("command `{command}` failed: {output}")]
    Command { command: String, output: String },

    /// A relay operation did not complete in time
    #[error("timed out")]
    Timeout,
}
