//! CLI command implementations.

pub mod chat;
pub mod listen;
pub mod send;

use anyhow::{Context, Result};
use courier_client::{ClientConfig, RelayClient, SessionObserver, WebSocketTransport};
use std::sync::Arc;

/// Connect and declare the configured name.
pub(crate) async fn connect(
    config: ClientConfig,
    observer: Arc<dyn SessionObserver>,
) -> Result<Arc<RelayClient<WebSocketTransport>>> {
    let url = config.relay_url.clone();
    let client = RelayClient::new(config, WebSocketTransport::new(), observer);
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to relay at {url}"))?;
    tracing::info!("Connected to {} as {:?}", url, client.name());
    Ok(Arc::new(client))
}

/// Send Disconnect and close.
pub(crate) async fn disconnect(client: &RelayClient<WebSocketTransport>) -> Result<()> {
    client.disconnect().await.context("Failed to disconnect")?;
    tracing::info!("Disconnected {:?}", client.name());
    Ok(())
}
