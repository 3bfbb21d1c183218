//! Gateway configuration
//!
//! Every field has a default, so an empty (or partial) TOML file is a valid
//! configuration. Durations are written as integer milliseconds in the
//! file. The builder-style setters exist for embedding and tests.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GatewayError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the HTTP listener binds to
    pub listen: SocketAddr,

    /// Concurrent-connection ceiling (0 = unlimited)
    pub max_connections: usize,

    /// How long a client may take to send its request head
    #[serde(deserialize_with = "duration_ms")]
    pub head_timeout: Duration,

    /// User agents answered with an empty 200 (health-check bypass)
    pub fake_user_agents: Vec<String>,

    /// User agents that get fabricated headers before resolution
    pub fake_header_user_agents: Vec<String>,

    /// Pause/resume streaming in lockstep with engine playback events
    pub playback_obey: bool,

    /// Delay before the stream (or the relay input) is opened
    #[serde(deserialize_with = "duration_ms")]
    pub pre_roll: Duration,

    /// Wait for the relay's listening port after starting a broadcast
    #[serde(deserialize_with = "duration_ms")]
    pub relay_settle: Duration,

    /// Grace period before the last client's exit destroys the session
    #[serde(deserialize_with = "duration_ms")]
    pub destroy_grace: Duration,

    /// Backend engine endpoint and timeouts
    pub engine: EngineConfig,

    /// Broadcast relay endpoint
    pub relay: RelayConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".parse().expect("static addr"),
            max_connections: 0,
            head_timeout: Duration::from_secs(10),
            fake_user_agents: Vec::new(),
            fake_header_user_agents: Vec::new(),
            playback_obey: false,
            pre_roll: Duration::from_secs(1),
            relay_settle: Duration::from_millis(500),
            destroy_grace: Duration::from_secs(3),
            engine: EngineConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| GatewayError::Config(format!("{}: {e}", path.display())))
    }

    /// Set the bind address
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    /// Set the connection ceiling
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the destroy grace period
    pub fn destroy_grace(mut self, grace: Duration) -> Self {
        self.destroy_grace = grace;
        self
    }

    /// Set the pre-roll delay
    pub fn pre_roll(mut self, delay: Duration) -> Self {
        self.pre_roll = delay;
        self
    }

    /// Set the relay settle delay
    pub fn relay_settle(mut self, delay: Duration) -> Self {
        self.relay_settle = delay;
        self
    }

    /// Enable playback-obey mode
    pub fn playback_obey(mut self, obey: bool) -> Self {
        self.playback_obey = obey;
        self
    }
}

/// Backend engine endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine control host; also substituted for loopback in resolved URLs
    pub host: String,
    /// Engine control port
    pub port: u16,
    /// Product key sent during the auth handshake
    pub product_key: String,
    /// TCP connect budget
    #[serde(deserialize_with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Budget for one command/reply round trip
    #[serde(deserialize_with = "duration_ms")]
    pub result_timeout: Duration,
    /// Budget for the content to produce a playable URL
    #[serde(deserialize_with = "duration_ms")]
    pub stream_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 62062,
            product_key: String::new(),
            connect_timeout: Duration::from_secs(5),
            result_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(45),
        }
    }
}

/// Broadcast relay endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Whether relay fan-out is configured at all
    pub enabled: bool,
    /// Relay control host; also the host of published broadcast URLs
    pub host: String,
    /// Relay control (telnet) port
    pub port: u16,
    /// Control-interface password
    pub password: String,
    /// Port the relay publishes broadcasts on
    pub out_port: u16,
    /// Output mux
    pub mux: String,
    /// Extra output-chain stage inserted before the publisher
    pub pre_access: Option<String>,
    /// Force the relay input through its ffmpeg demuxer
    pub force_demux: bool,
    /// TCP connect/command budget
    #[serde(deserialize_with = "duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".into(),
            port: 4212,
            password: "admin".into(),
            out_port: 8081,
            mux: "ts".into(),
            pre_access: None,
            force_demux: false,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

fn duration_ms<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();

        assert_eq!(config.listen.port(), 8000);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.destroy_grace, Duration::from_secs(3));
        assert_eq!(config.engine.port, 62062);
        assert_eq!(config.engine.stream_timeout, Duration::from_secs(45));
        assert!(!config.relay.enabled);
        assert_eq!(config.relay.mux, "ts");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:9000"
            destroy_grace = 1500

            [engine]
            host = "10.0.0.2"

            [relay]
            enabled = true
            password = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.destroy_grace, Duration::from_millis(1500));
        assert_eq!(config.engine.host, "10.0.0.2");
        assert_eq!(config.engine.port, 62062);
        assert!(config.relay.enabled);
        assert_eq!(config.relay.password, "secret");
        assert_eq!(config.relay.out_port, 8081);
    }

    #[test]
    fn test_builder_chaining() {
        let config = GatewayConfig::default()
            .max_connections(50)
            .destroy_grace(Duration::from_millis(100))
            .pre_roll(Duration::ZERO)
            .playback_obey(true);

        assert_eq!(config.max_connections, 50);
        assert_eq!(config.destroy_grace, Duration::from_millis(100));
        assert_eq!(config.pre_roll, Duration::ZERO);
        assert!(config.playback_obey);
    }
}
