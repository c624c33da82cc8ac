//! Print everything addressed to this name.

use anyhow::{Context, Result};
use courier_client::ClientConfig;
use std::sync::Arc;

use crate::printer::PrintObserver;

/// Run the listen command until the relay closes the connection or Ctrl+C.
pub async fn run(config: ClientConfig) -> Result<()> {
    let client = super::connect(config, Arc::new(PrintObserver)).await?;

    tokio::select! {
        result = client.run() => result.context("Connection to relay failed")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("Interrupted; leaving");
            super::disconnect(&client).await?;
        }
    }

    Ok(())
}
