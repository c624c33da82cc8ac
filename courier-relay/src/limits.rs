//! Rate limiting for courier-relay.
//!
//! Provides protection against connection flooding and message spam:
//! - connection attempts are limited per peer IP address
//! - transfers are limited per connection
//!
//! Both use the governor crate's keyed rate limiters backed by DashMap.

use crate::config::{ConfigError, LimitsConfig};
use crate::directory::ConnectionId;
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Rate limiters for the relay server.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits connection attempts per peer IP (`limits.connections_per_ip`).
    connection_limiter: Arc<KeyedLimiter<IpAddr>>,
    /// Limits transfers per connection (`limits.messages_per_minute`).
    message_limiter: Arc<KeyedLimiter<ConnectionId>>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("connection_limiter", &"KeyedLimiter<IpAddr>")
            .field("message_limiter", &"KeyedLimiter<ConnectionId>")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a configured rate is zero.
    pub fn new(config: &LimitsConfig) -> Result<Self, ConfigError> {
        let connections_per_minute =
            NonZeroU32::new(config.connections_per_ip).ok_or(ConfigError::Invalid {
                field: "limits.connections_per_ip",
                reason: "must be > 0",
            })?;
        let messages_per_minute =
            NonZeroU32::new(config.messages_per_minute).ok_or(ConfigError::Invalid {
                field: "limits.messages_per_minute",
                reason: "must be > 0",
            })?;

        Ok(Self {
            connection_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(
                connections_per_minute,
            ))),
            message_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(messages_per_minute))),
        })
    }

    /// Check if a connection attempt from `ip` is allowed.
    pub fn check_connection(&self, ip: IpAddr) -> Result<(), RateLimitError> {
        self.connection_limiter
            .check_key(&ip)
            .map_err(|_| RateLimitError::ConnectionLimitExceeded)
    }

    /// Check if a transfer from connection `id` is allowed.
    pub fn check_message(&self, id: ConnectionId) -> Result<(), RateLimitError> {
        self.message_limiter
            .check_key(&id)
            .map_err(|_| RateLimitError::MessageLimitExceeded)
    }

    /// Get the number of tracked connection keys (for metrics).
    pub fn connection_keys_count(&self) -> usize {
        self.connection_limiter.len()
    }

    /// Get the number of tracked message keys (for metrics).
    pub fn message_keys_count(&self) -> usize {
        self.message_limiter.len()
    }

    /// Evict idle entries from the keyed limiters.
    ///
    /// Closed connections and quiet peers leave keys behind;
    /// `retain_recent()` drops those whose cells have fully recharged.
    pub fn shrink(&self) {
        self.connection_limiter.retain_recent();
        self.message_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Too many connection attempts from this address.
    #[error("connection rate limit exceeded")]
    ConnectionLimitExceeded,
    /// Too many transfers from this connection.
    #[error("message rate limit exceeded")]
    MessageLimitExceeded,
}
