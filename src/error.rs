//! Gateway error types
//!
//! Every failure a request can hit maps onto one of four client-visible
//! classes: bad request, capacity, upstream gateway, internal.

use thiserror::Error;

use crate::engine::EngineError;
use crate::relay::RelayError;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error for request handling
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed path, unsupported kind or extension
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Global connection ceiling reached
    #[error("connection limit reached")]
    CapacityExceeded,

    /// A second direct consumer tried to join a stream without the relay
    #[error("stream already has a direct consumer")]
    StreamBusy,

    /// Backend engine failure
    #[error("engine: {0}")]
    Engine(#[from] EngineError),

    /// Broadcast relay failure
    #[error("relay: {0}")]
    Relay(#[from] RelayError),

    /// Origin fetch failure
    #[error("origin fetch: {0}")]
    Origin(#[source] reqwest::Error),

    /// Client or listener socket failure
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded
    #[error("config: {0}")]
    Config(String),

    /// Anything else
    #[error("internal: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status code surfaced to the client for this failure class
    pub fn status(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::CapacityExceeded | GatewayError::StreamBusy => 503,
            GatewayError::Engine(_) | GatewayError::Relay(_) | GatewayError::Origin(_) => 502,
            GatewayError::Io(_) | GatewayError::Config(_) | GatewayError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::BadRequest("x".into()).status(), 400);
        assert_eq!(GatewayError::CapacityExceeded.status(), 503);
        assert_eq!(GatewayError::StreamBusy.status(), 503);
        assert_eq!(GatewayError::Engine(EngineError::Timeout).status(), 502);
        assert_eq!(GatewayError::Internal("x".into()).status(), 500);
    }
}
