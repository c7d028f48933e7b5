//! Pool statistics (spec §3 `PoolStats`).
//!
//! Grounded on `sqlx-core`'s `pool::metrics` split between a live collector
//! and a plain snapshot struct (`pool::metrics::simple::SimplePoolMetricsSnapshot`);
//! here the "collector" is just the pool's own atomics, since no external
//! metrics export is in scope (spec §1 Non-goals).

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters tracked by the pool for the lifetime of the process.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) connections_created: AtomicU64,
    pub(crate) connections_closed: AtomicU64,
    pub(crate) acquire_requests: AtomicU64,
    pub(crate) acquire_timeouts: AtomicU64,
}

impl Counters {
    pub(crate) fn snapshot(
        &self,
        total_connections: u32,
        idle_connections: u32,
        in_use_connections: u32,
        usage_sum: u64,
        usage_count: u64,
    ) -> PoolStats {
        PoolStats {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            acquire_requests: self.acquire_requests.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            total_connections,
            idle_connections,
            in_use_connections,
            avg_usage_per_connection: if usage_count == 0 {
                0.0
            } else {
                usage_sum as f64 / usage_count as f64
            },
        }
    }
}

/// An owned, point-in-time snapshot returned by `GetStats()`.
///
/// Counters are monotone across the life of the pool; gauges reflect the
/// state at the moment the snapshot was taken under the critical section.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolStats {
    pub connections_created: u64,
    pub connections_closed: u64,
    pub acquire_requests: u64,
    pub acquire_timeouts: u64,
    pub total_connections: u32,
    pub idle_connections: u32,
    pub in_use_connections: u32,
    pub avg_usage_per_connection: f64,
}
