//! Process-wide gateway state
//!
//! Everything shared across connection tasks lives here, constructed once
//! at startup and passed down as an `Arc` — no ambient globals. The
//! registry is the only mutable piece; the rest is read-only after
//! construction.

use std::sync::Arc;

use crate::engine::EngineBackend;
use crate::error::{GatewayError, Result};
use crate::plugin::PluginTable;
use crate::registry::SessionRegistry;
use crate::relay::RelayController;
use crate::server::config::GatewayConfig;
use crate::stats::ConnectionGauge;

/// Shared state for all connection handlers
pub struct GatewayContext {
    /// Read-only configuration
    pub config: GatewayConfig,
    /// Session registry gating engine-session lifecycles
    pub registry: SessionRegistry,
    /// Engine session factory
    pub engine: Arc<dyn EngineBackend>,
    /// Broadcast relay, when fan-out is configured
    pub relay: Option<Arc<dyn RelayController>>,
    /// Path-prefix plugin table
    pub plugins: PluginTable,
    /// Active-connection counter
    pub connections: ConnectionGauge,
    /// Shared origin-fetch client
    pub http: reqwest::Client,
}

impl GatewayContext {
    /// Assemble the context
    ///
    /// The origin client applies the engine connect timeout to its own
    /// connects; response streaming itself is unbounded.
    pub fn new(
        config: GatewayConfig,
        engine: Arc<dyn EngineBackend>,
        relay: Option<Arc<dyn RelayController>>,
        plugins: PluginTable,
    ) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.engine.connect_timeout)
            .build()
            .map_err(|e| GatewayError::Internal(format!("http client: {e}")))?;

        Ok(Arc::new(Self {
            config,
            registry: SessionRegistry::new(),
            engine,
            relay,
            plugins,
            connections: ConnectionGauge::new(),
            http,
        }))
    }

    /// Whether relay fan-out is active
    pub fn relay_mode(&self) -> bool {
        self.relay.is_some()
    }
}
