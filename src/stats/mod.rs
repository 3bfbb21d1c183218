//! Gateway statistics

pub mod metrics;

pub use metrics::{ConnectionGauge, ConnectionGuard, GatewayStats};
