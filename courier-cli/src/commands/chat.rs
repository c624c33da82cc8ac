//! Interactive session.
//!
//! Each input line is one command:
//!
//! ```text
//! bob hello there          text to bob
//! ALL hi everyone          text to every other endpoint
//! img bob ./photo.jpg      image file to bob (also: audio, video)
//! /quit                    disconnect and exit
//! ```

use anyhow::{Context, Result};
use courier_client::ClientConfig;
use courier_types::MediaKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::printer::PrintObserver;

const USAGE: &str = "usage: <to> <message> | img|audio|video <to> <path> | /quit";

/// A parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatCommand {
    /// Send text.
    Text {
        /// Receiver.
        to: String,
        /// Message body.
        text: String,
    },
    /// Send a media file.
    Media {
        /// Media kind.
        kind: MediaKind,
        /// Receiver.
        to: String,
        /// File to send.
        path: PathBuf,
    },
    /// Print usage.
    Help,
    /// Leave.
    Quit,
}

/// Parse one input line; `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<ChatCommand>, &'static str> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match line {
        "/quit" | "/exit" => return Ok(Some(ChatCommand::Quit)),
        "/help" => return Ok(Some(ChatCommand::Help)),
        _ => {}
    }

    let (first, rest) = split_word(line);
    if let Ok(kind) = first.parse::<MediaKind>() {
        let (to, path) = split_word(rest);
        if to.is_empty() || path.is_empty() {
            return Err(USAGE);
        }
        return Ok(Some(ChatCommand::Media {
            kind,
            to: to.to_string(),
            path: PathBuf::from(path),
        }));
    }

    if rest.is_empty() {
        return Err(USAGE);
    }
    Ok(Some(ChatCommand::Text {
        to: first.to_string(),
        text: rest.to_string(),
    }))
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

/// Run the chat command.
pub async fn run(config: ClientConfig) -> Result<()> {
    let client = super::connect(config, Arc::new(PrintObserver)).await?;
    println!("{USAGE}");

    let runner = Arc::clone(&client);
    let mut receive = tokio::spawn(async move { runner.run().await });
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            result = &mut receive => {
                // Relay went away; run() already reported the disconnect
                return result.context("Receive task failed")?.map_err(Into::into);
            }
        };

        // EOF behaves like /quit
        let Some(line) = line else { break };

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };

        let sent = match command {
            ChatCommand::Quit => break,
            ChatCommand::Help => {
                println!("{USAGE}");
                continue;
            }
            ChatCommand::Text { to, text } => client.send(&text, &to).await,
            ChatCommand::Media { kind, to, path } => client.send_media(kind, &path, &to).await,
        };
        if let Err(e) = sent {
            tracing::debug!("Send failed: {:?}", e);
            println!("! {e}");
        }
    }

    super::disconnect(&client).await?;
    receive.abort();
    Ok(())
}
