//! WebSocket accept loop.

use crate::connection::handle_connection;
use crate::error::{RelayError, Result};
use crate::server::{CourierRelay, RelayMetrics};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// A bound relay listener.
#[derive(Debug)]
pub struct RelayListener {
    listener: TcpListener,
    relay: Arc<CourierRelay>,
}

impl RelayListener {
    /// Bind to `address` (for example `0.0.0.0:8765`; port 0 picks a free one).
    pub async fn bind(relay: Arc<CourierRelay>, address: &str) -> Result<Self> {
        let addr: SocketAddr = address.parse().map_err(|source| RelayError::Address {
            address: address.to_string(),
            source,
        })?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Relay listening on {}", listener.local_addr()?);
        Ok(Self { listener, relay })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Each accepted socket runs on its own task; one failing connection
    /// never stops the loop.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested; stopping accept loop");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Transient (e.g. out of file descriptors)
                        tracing::error!("Accept error: {}", e);
                        continue;
                    }
                },
            };

            if let Err(e) = self.relay.rate_limits().check_connection(peer.ip()) {
                tracing::warn!("Refusing {}: {}", peer, e);
                RelayMetrics::incr(&self.relay.metrics().rate_limit_hits);
                continue;
            }

            let Some(slot) = self.relay.try_acquire_slot() else {
                tracing::warn!(
                    "Refusing {}: {} connections open",
                    peer,
                    self.relay.active_connections()
                );
                continue;
            };

            let relay = Arc::clone(&self.relay);
            tokio::spawn(async move {
                let _slot = slot;
                if let Err(e) = handle_connection(relay, stream, peer).await {
                    tracing::debug!("Connection {} ended with error: {}", peer, e);
                }
            });
        }
    }
}
