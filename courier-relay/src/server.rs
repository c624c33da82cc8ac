//! Main CourierRelay server coordination.
//!
//! CourierRelay owns the directory, the routing engine, rate limiters and
//! metrics, and is shared by every connection task and the HTTP surface.

use crate::config::Config;
use crate::directory::Directory;
use crate::engine::RelayEngine;
use crate::error::Result;
use crate::limits::RateLimits;
use crate::liveness::LivenessMonitor;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total WebSocket connections accepted.
    pub connections_total: AtomicU64,
    /// Total declarations handled.
    pub declarations_total: AtomicU64,
    /// Total transfers handled (routed or not).
    pub transfers_total: AtomicU64,
    /// Total deliveries queued to receivers, broadcast fan-out included.
    pub deliveries_total: AtomicU64,
    /// Total warnings sent to clients.
    pub warnings_total: AtomicU64,
    /// Total heartbeat evictions.
    pub evictions_total: AtomicU64,
    /// Total frames that failed to decode.
    pub malformed_total: AtomicU64,
    /// Total rate limit rejections (connections + messages).
    pub rate_limit_hits: AtomicU64,
}

impl RelayMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Main relay server state.
pub struct CourierRelay {
    config: Config,
    directory: Arc<Directory>,
    metrics: Arc<RelayMetrics>,
    engine: RelayEngine,
    rate_limits: RateLimits,
    active_connections: AtomicUsize,
    started_at: Instant,
}

impl std::fmt::Debug for CourierRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierRelay")
            .field("config", &self.config)
            .field("rate_limits", &self.rate_limits)
            .field("metrics", &self.metrics)
            .field("active_connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}

impl CourierRelay {
    /// Create a relay from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let rate_limits = RateLimits::new(&config.limits)?;
        let directory = Arc::new(Directory::new());
        let metrics = Arc::new(RelayMetrics::default());
        let engine = RelayEngine::new(
            Arc::clone(&directory),
            Arc::clone(&metrics),
            &config.server.relay_identity,
        )
        .require_declaration(config.limits.require_declaration);

        Ok(Self {
            config,
            directory,
            metrics,
            engine,
            rate_limits,
            active_connections: AtomicUsize::new(0),
            started_at: Instant::now(),
        })
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The client directory.
    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// The routing engine.
    pub fn engine(&self) -> &RelayEngine {
        &self.engine
    }

    /// Get access to the rate limiters.
    pub fn rate_limits(&self) -> &RateLimits {
        &self.rate_limits
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Build the liveness monitor for this relay.
    pub fn liveness_monitor(&self) -> LivenessMonitor {
        LivenessMonitor::new(
            Arc::clone(&self.directory),
            Arc::clone(&self.metrics),
            &self.config.server.relay_identity,
            self.config.heartbeat.ping_timeout(),
        )
        .with_rate_limits(self.rate_limits.clone())
    }

    /// Number of open WebSocket connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Seconds since the relay was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Reserve a connection slot; `None` when the relay is at capacity.
    ///
    /// The slot is released when the returned guard drops.
    pub fn try_acquire_slot(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.limits.max_concurrent_connections;
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()?;
        Some(ConnectionSlot {
            relay: Arc::clone(self),
        })
    }
}

/// A reserved connection slot.
#[derive(Debug)]
pub struct ConnectionSlot {
    relay: Arc<CourierRelay>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.relay.active_connections.fetch_sub(1, Ordering::AcqRel);
    }
}
