//! peergate — HTTP gateway over a P2P streaming engine
//!
//! Accepts plain HTTP GET requests for video content, brokers access to a
//! backend streaming engine (reached over its private control protocol) or
//! a broadcast relay, and pipes the video bytes back to the client.
//!
//! The interesting part is session multiplexing: any number of clients may
//! ask for the same content concurrently, but the engine is initialized at
//! most once per content key, kept alive only while clients are attached,
//! and torn down after a grace period once the last one leaves — while
//! individual clients come and go at arbitrary times without corrupting the
//! shared bookkeeping or leaking engine sessions.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use peergate::engine::TcpEngineBackend;
//! use peergate::plugin::PluginTable;
//! use peergate::{Gateway, GatewayConfig, GatewayContext};
//!
//! # async fn example() -> peergate::error::Result<()> {
//! let config = GatewayConfig::default();
//! let engine = Arc::new(TcpEngineBackend::new(config.engine.clone()));
//! let context = GatewayContext::new(config, engine, None, PluginTable::new())?;
//!
//! let gateway = Gateway::bind(context).await?;
//! gateway.run().await
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod http;
pub mod plugin;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

pub use error::GatewayError;
pub use server::{EngineConfig, Gateway, GatewayConfig, GatewayContext, RelayConfig};
