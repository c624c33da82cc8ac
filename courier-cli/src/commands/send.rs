//! Send one message and wait for the relay's receipt.

use anyhow::{Context, Result};
use courier_client::{ChannelObserver, ClientConfig, SessionEvent};
use courier_types::{MediaKind, SystemToken};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::printer::format_system;

/// What to send.
#[derive(Debug)]
pub enum Body {
    /// A text message.
    Text(String),
    /// A media file to read and encode.
    Media(MediaKind, PathBuf),
}

/// Run the send command.
pub async fn run(config: ClientConfig, to: &str, body: Body, timeout_secs: u64) -> Result<()> {
    let (observer, mut events) = ChannelObserver::new();
    let client = super::connect(config, Arc::new(observer)).await?;

    let runner = Arc::clone(&client);
    let receive = tokio::spawn(async move { runner.run().await });

    let sent = match &body {
        Body::Text(text) => {
            println!("Sending {} bytes to {to}...", text.len());
            client.send(text, to).await
        }
        Body::Media(kind, path) => {
            println!("Sending {kind} {} to {to}...", path.display());
            client.send_media(*kind, path, to).await
        }
    };
    sent.context("Failed to send")?;

    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::System {
                    token: SystemToken::Ok,
                } => return Ok(()),
                SessionEvent::Warning { text, .. } => anyhow::bail!("Relay refused: {text}"),
                SessionEvent::Disconnected { reason } => {
                    anyhow::bail!("Disconnected before receipt: {reason}")
                }
                SessionEvent::System { token } => {
                    if let Some(line) = format_system(&token) {
                        println!("{line}");
                    }
                }
                _ => {}
            }
        }
        anyhow::bail!("Session ended before receipt")
    })
    .await
    .context("Timed out waiting for the relay's receipt")?;

    super::disconnect(&client).await?;
    receive.abort();

    if let Err(e) = &outcome {
        tracing::warn!("Send to {:?} not relayed: {}", to, e);
    }
    outcome?;
    tracing::debug!("Relay accepted message for {:?}", to);
    println!("Relayed.");
    Ok(())
}
