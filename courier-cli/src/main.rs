//! # courier
//!
//! Command-line endpoint for the Courier relay.
//!
//! ## Commands
//!
//! - `chat`: Interactive session (type `<to> <message>`)
//! - `send`: Send one message and wait for the relay's receipt
//! - `listen`: Print everything addressed to this name
//!
//! ## Example
//!
//! ```bash
//! # Terminal 1
//! courier --name bob listen
//!
//! # Terminal 2
//! courier --name alice send bob "hello"
//! courier --name alice send bob --image photo.jpg
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use courier_client::ClientConfig;
use courier_types::{MediaKind, DEFAULT_RELAY_IDENTITY};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod printer;

use commands::{chat, listen, send};

/// Command-line endpoint for the Courier relay.
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Relay WebSocket URL
    #[arg(long, global = true, env = "COURIER_URL", default_value = "ws://127.0.0.1:8765")]
    url: String,

    /// Name to declare on the relay
    #[arg(long, short, global = true, env = "COURIER_NAME", default_value = "cli")]
    name: String,

    /// Name the relay signs its own envelopes with
    #[arg(long, global = true, env = "COURIER_RELAY_IDENTITY", default_value = DEFAULT_RELAY_IDENTITY)]
    relay_identity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive session
    Chat,

    /// Send one message (or media file) and wait for the relay's receipt
    Send {
        /// Receiver name, or ALL
        to: String,

        /// Text to send
        #[arg(required_unless_present_any = ["image", "audio", "video"])]
        message: Option<String>,

        /// Send an image file
        #[arg(long, conflicts_with_all = ["message", "audio", "video"])]
        image: Option<PathBuf>,

        /// Send an audio file
        #[arg(long, conflicts_with_all = ["message", "image", "video"])]
        audio: Option<PathBuf>,

        /// Send a video file
        #[arg(long, conflicts_with_all = ["message", "image", "audio"])]
        video: Option<PathBuf>,

        /// Seconds to wait for the receipt
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Print everything addressed to this name
    Listen,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config =
        ClientConfig::new(&cli.url, &cli.name).with_relay_identity(&cli.relay_identity);
    tracing::debug!("Using relay {} as {:?}", config.relay_url, config.name);

    match cli.command {
        Commands::Chat => chat::run(config).await?,
        Commands::Send {
            to,
            message,
            image,
            audio,
            video,
            timeout,
        } => {
            let body = match (message, image, audio, video) {
                (Some(text), ..) => send::Body::Text(text),
                (_, Some(path), ..) => send::Body::Media(MediaKind::Image, path),
                (_, _, Some(path), _) => send::Body::Media(MediaKind::Audio, path),
                (_, _, _, Some(path)) => send::Body::Media(MediaKind::Video, path),
                _ => anyhow::bail!("Must specify a message or a media file"),
            };
            send::run(config, &to, body, timeout).await?;
        }
        Commands::Listen => listen::run(config).await?,
    }

    Ok(())
}
