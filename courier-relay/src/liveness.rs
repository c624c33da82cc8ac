//! Background heartbeat task.
//!
//! Periodically pings every registered endpoint and evicts those that did
//! not answer within the grace window.

use crate::config::HeartbeatConfig;
use crate::directory::Directory;
use crate::limits::RateLimits;
use crate::server::RelayMetrics;
use courier_types::Envelope;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// Runs heartbeat cycles over a directory.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    directory: Arc<Directory>,
    metrics: Arc<RelayMetrics>,
    identity: String,
    ping_timeout: Duration,
    rate_limits: Option<RateLimits>,
}

impl LivenessMonitor {
    /// Create a monitor that pings as `identity` and waits `ping_timeout`
    /// for answers.
    pub fn new(
        directory: Arc<Directory>,
        metrics: Arc<RelayMetrics>,
        identity: &str,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            metrics,
            identity: identity.to_string(),
            ping_timeout,
            rate_limits: None,
        }
    }

    /// Also shrink these limiters once per cycle.
    pub fn with_rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = Some(rate_limits);
        self
    }

    /// Run one heartbeat cycle; returns the evicted names.
    ///
    /// Marks every entry as awaiting, pings it, sleeps for the grace window,
    /// then removes whatever is still awaiting and tells those connections
    /// to close.
    pub async fn run_cycle(&self) -> Vec<String> {
        let targets = self.directory.mark_all_awaiting().await;
        tracing::debug!("Heartbeat: pinging {} endpoints", targets.len());

        for (_, handle) in &targets {
            handle.send(Envelope::ping(&self.identity));
        }

        tokio::time::sleep(self.ping_timeout).await;

        let evicted = self.directory.evict_unresponsive().await;
        let mut names = Vec::with_capacity(evicted.len());
        for (name, handle) in evicted {
            tracing::info!("Evicting {:?} (no pong within {:?})", name, self.ping_timeout);
            handle.close();
            names.push(name);
        }
        self.metrics
            .evictions_total
            .fetch_add(names.len() as u64, Ordering::Relaxed);

        if let Some(limits) = &self.rate_limits {
            limits.shrink();
        }

        names
    }
}

/// Spawn the background heartbeat task.
///
/// Returns a handle that can be used to abort the task. When the heartbeat
/// is disabled the task ends immediately.
pub fn spawn_liveness_task(
    monitor: LivenessMonitor,
    config: HeartbeatConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !config.enabled {
            tracing::info!("Heartbeat disabled");
            return;
        }

        let interval = config.ping_interval();
        tracing::info!(
            "Heartbeat started (interval: {}s, timeout: {}s)",
            config.ping_interval_secs,
            config.ping_timeout_secs
        );

        loop {
            // Sleep rather than `interval`: a zero interval is valid here
            tokio::time::sleep(interval).await;

            let evicted = monitor.run_cycle().await;
            if !evicted.is_empty() {
                tracing::info!("Heartbeat: evicted {} endpoints", evicted.len());
            }
            if interval.is_zero() {
                tokio::task::yield_now().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::ConnectionHandle;

    fn monitor(directory: &Arc<Directory>) -> LivenessMonitor {
        LivenessMonitor::new(
            Arc::clone(directory),
            Arc::new(RelayMetrics::default()),
            "SERVER",
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn silent_endpoint_is_evicted_and_closed() {
        let directory = Arc::new(Directory::new());
        let (handle, mut rx) = ConnectionHandle::channel(4);
        directory.register("mute", handle.clone()).await;

        let evicted = monitor(&directory).run_cycle().await;

        assert_eq!(evicted, vec!["mute".to_string()]);
        assert!(directory.is_empty().await);
        assert_eq!(rx.recv().await, Some(Envelope::ping("SERVER")));
        assert!(handle.is_close_requested());
    }

    #[tokio::test]
    async fn stalled_endpoint_with_full_queue_is_still_closed() {
        let directory = Arc::new(Directory::new());
        let (handle, mut rx) = ConnectionHandle::channel(1);
        directory.register("stalled", handle.clone()).await;

        let monitor = LivenessMonitor::new(
            Arc::clone(&directory),
            Arc::new(RelayMetrics::default()),
            "SERVER",
            Duration::ZERO,
        );
        // The ping fills the queue
        let evicted = monitor.run_cycle().await;

        assert_eq!(evicted, vec!["stalled".to_string()]);
        assert!(handle.is_close_requested());
        tokio::time::timeout(Duration::from_secs(1), handle.close_requested())
            .await
            .expect("close must not depend on queue space");
        assert_eq!(rx.try_recv().ok(), Some(Envelope::ping("SERVER")));
    }

    #[tokio::test]
    async fn ponging_endpoint_is_retained() {
        let directory = Arc::new(Directory::new());
        let (handle, mut rx) = ConnectionHandle::channel(4);
        directory.register("alive", handle.clone()).await;

        // Answer the ping from "the client" while the cycle sleeps
        let responder = {
            let directory = Arc::clone(&directory);
            let id = handle.id();
            tokio::spawn(async move {
                if rx.recv().await.is_some() {
                    directory.clear_awaiting("alive", id).await;
                }
            })
        };

        let evicted = monitor(&directory).run_cycle().await;
        assert!(evicted.is_empty());
        assert_eq!(directory.len().await, 1);

        responder.await.unwrap();
        assert!(!handle.is_close_requested());
    }

    #[tokio::test]
    async fn cycle_on_empty_directory_is_noop() {
        let directory = Arc::new(Directory::new());
        assert!(monitor(&directory).run_cycle().await.is_empty());
    }

    #[tokio::test]
    async fn evictions_are_counted() {
        let directory = Arc::new(Directory::new());
        let metrics = Arc::new(RelayMetrics::default());
        directory.register("a", ConnectionHandle::channel(4).0).await;
        directory.register("b", ConnectionHandle::channel(4).0).await;

        let monitor = LivenessMonitor::new(
            Arc::clone(&directory),
            Arc::clone(&metrics),
            "SERVER",
            Duration::ZERO,
        );
        monitor.run_cycle().await;
        assert_eq!(metrics.evictions_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn zero_interval_task_empties_directory() {
        let directory = Arc::new(Directory::new());
        let (handle, _rx) = ConnectionHandle::channel(64);
        directory.register("ghost", handle).await;

        let config = HeartbeatConfig {
            enabled: true,
            ping_interval_secs: 0,
            ping_timeout_secs: 0,
        };
        let monitor = LivenessMonitor::new(
            Arc::clone(&directory),
            Arc::new(RelayMetrics::default()),
            "SERVER",
            config.ping_timeout(),
        );
        let task = spawn_liveness_task(monitor, config);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !directory.is_empty().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("directory should be emptied");
        task.abort();
    }

    #[tokio::test]
    async fn liveness_task_disabled() {
        let directory = Arc::new(Directory::new());
        let config = HeartbeatConfig {
            enabled: false,
            ..HeartbeatConfig::default()
        };

        let handle = spawn_liveness_task(monitor(&directory), config);

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("Task should complete when disabled")
            .expect("Task should not panic");
    }
}
