//! Connection accounting
//!
//! The gauge is the one process-wide counter shared by all connection tasks:
//! incremented when a connection is accepted, decremented when its handler
//! returns. The coordinator reads it to enforce the configured ceiling.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Process-wide active-connection counter
///
/// Cloning shares the underlying counters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionGauge {
    inner: Arc<GaugeInner>,
}

#[derive(Debug, Default)]
struct GaugeInner {
    active: AtomicUsize,
    total: AtomicU64,
}

impl ConnectionGauge {
    /// Create a new gauge with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection
    ///
    /// The returned guard decrements the active count when dropped.
    pub fn acquire(&self) -> ConnectionGuard {
        self.inner.active.fetch_add(1, Ordering::Relaxed);
        self.inner.total.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of connections currently being handled
    pub fn active(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    /// Number of connections accepted since startup
    pub fn total_accepted(&self) -> u64 {
        self.inner.total.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            active_connections: self.active(),
            total_connections: self.total_accepted(),
        }
    }
}

/// RAII handle for one accepted connection
#[derive(Debug)]
pub struct ConnectionGuard {
    inner: Arc<GaugeInner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct GatewayStats {
    /// Current active connections
    pub active_connections: usize,
    /// Total connections ever accepted
    pub total_connections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_counts_guards() {
        let gauge = ConnectionGauge::new();
        assert_eq!(gauge.active(), 0);

        let a = gauge.acquire();
        let b = gauge.acquire();
        assert_eq!(gauge.active(), 2);
        assert_eq!(gauge.total_accepted(), 2);

        drop(a);
        assert_eq!(gauge.active(), 1);
        assert_eq!(gauge.total_accepted(), 2);

        drop(b);
        assert_eq!(gauge.active(), 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let gauge = ConnectionGauge::new();
        let _guard = gauge.acquire();

        let stats = gauge.stats();
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.total_connections, 1);
    }
}
