//! RelayClient - the main interface for Courier endpoints.
//!
//! This module provides [`RelayClient`], the API consumers use to join a
//! relay under a name, send payloads, and receive inbound traffic.
//!
//! # Architecture
//!
//! RelayClient uses a pure state machine (from courier-core) for protocol
//! logic and interprets the actions to perform actual I/O via the
//! Transport trait. Inbound events go to the injected observer.
//!
//! ```text
//! Application → RelayClient → Transport → Relay
//!     ↑              ↓
//! SessionObserver  courier-core (pure state machine)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use courier_core::{Action, Event, Session, SessionError, SessionEvent, SessionState};
use courier_types::{Envelope, EnvelopeError, MediaKind, Payload, DEFAULT_RELAY_IDENTITY};

use crate::observer::{dispatch, SessionObserver};
use crate::transport::{Transport, TransportError};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Envelope could not be encoded.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The session state does not allow the operation.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A media file could not be read.
    #[error("failed to read {path}: {source}")]
    Media {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Configuration for RelayClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay URL, e.g. `ws://127.0.0.1:8765`.
    pub relay_url: String,
    /// Name to declare.
    pub name: String,
    /// Emitter name the relay uses for its own envelopes.
    pub relay_identity: String,
}

impl ClientConfig {
    /// Create a configuration.
    pub fn new(relay_url: &str, name: &str) -> Self {
        Self {
            relay_url: relay_url.to_string(),
            name: name.to_string(),
            relay_identity: DEFAULT_RELAY_IDENTITY.to_string(),
        }
    }

    /// Set the declared name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the relay identity (the relay's `server.relay_identity`).
    pub fn with_relay_identity(mut self, relay_identity: &str) -> Self {
        self.relay_identity = relay_identity.to_string();
        self
    }
}

/// A connected (or connecting) relay endpoint.
pub struct RelayClient<T: Transport> {
    config: ClientConfig,
    transport: T,
    observer: Arc<dyn SessionObserver>,
    session: Mutex<Session>,
}

impl<T: Transport> std::fmt::Debug for RelayClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> RelayClient<T> {
    /// Create a new client. Nothing is sent until [`connect`](Self::connect).
    pub fn new(config: ClientConfig, transport: T, observer: Arc<dyn SessionObserver>) -> Self {
        let session =
            Session::new(config.name.clone()).with_relay_identity(config.relay_identity.clone());
        Self {
            config,
            transport,
            observer,
            session: Mutex::new(session),
        }
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Open the transport and declare the configured name.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if let Err(e) = self.transport.connect(&self.config.relay_url).await {
            tracing::warn!("Connection to {} failed: {}", self.config.relay_url, e);
            self.apply(Event::TransportFailed {
                error: e.to_string(),
            })
            .await?;
            return Err(e.into());
        }

        tracing::info!(
            "Connected to {} as {:?}",
            self.config.relay_url,
            self.config.name
        );
        self.apply(Event::TransportOpened).await
    }

    /// Send a text message to `receiver`.
    pub async fn send(&self, text: &str, receiver: &str) -> Result<(), ClientError> {
        self.send_payload(&Payload::Text(text.to_string()), receiver)
            .await
    }

    /// Send a media file to `receiver`.
    pub async fn send_media(
        &self,
        kind: MediaKind,
        path: &Path,
        receiver: &str,
    ) -> Result<(), ClientError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| ClientError::Media {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::debug!("Sending {} ({} bytes) to {}", kind, data.len(), receiver);
        self.send_payload(&Payload::media(kind, data), receiver)
            .await
    }

    /// Send an already-built payload to `receiver`.
    pub async fn send_payload(&self, payload: &Payload, receiver: &str) -> Result<(), ClientError> {
        // Holding the session lock orders this send after the declaration
        let session = self.session.lock().await;
        let envelope = session.compose(receiver, payload)?;
        self.transport.send(&envelope.encode()?).await?;
        Ok(())
    }

    /// Receive and dispatch inbound envelopes until the session closes.
    ///
    /// Heartbeat pongs and delivery acknowledgments are sent from here.
    /// Frames that do not decode are logged and skipped.
    pub async fn run(&self) -> Result<(), ClientError> {
        loop {
            if self.state().await == SessionState::Closed {
                return Ok(());
            }

            match self.transport.recv().await {
                Ok(bytes) => match Envelope::decode(&bytes) {
                    Ok(envelope) => {
                        tracing::trace!("Inbound {:?} from {:?}", envelope.kind(), envelope.emitter());
                        self.apply(Event::EnvelopeReceived { envelope }).await?;
                    }
                    Err(e) => {
                        tracing::debug!("Skipping undecodable frame: {}", e);
                    }
                },
                Err(TransportError::ConnectionClosed) => {
                    self.apply(Event::TransportClosed {
                        reason: "connection closed".into(),
                    })
                    .await?;
                    return Ok(());
                }
                Err(e) => {
                    if self.state().await == SessionState::Closed {
                        return Ok(());
                    }
                    self.apply(Event::TransportFailed {
                        error: e.to_string(),
                    })
                    .await?;
                    return Err(e.into());
                }
            }
        }
    }

    /// Send a Disconnect and close the transport without waiting for a reply.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.apply(Event::DisconnectRequested).await?;
        self.apply(Event::TransportClosed {
            reason: "user requested".into(),
        })
        .await
    }

    /// Get a reference to the underlying transport (for testing).
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Feed an event through the state machine and execute its actions.
    ///
    /// Sends and transport closure happen under the session lock; observer
    /// callbacks run after it is released.
    async fn apply(&self, event: Event) -> Result<(), ClientError> {
        let mut emitted = Vec::new();
        let mut result = Ok(());

        {
            let mut session = self.session.lock().await;
            let (next, actions) = session.clone().on_event(event);
            *session = next;

            for action in actions {
                match action {
                    Action::Send(envelope) => {
                        if let Err(e) = self.send_envelope(&envelope).await {
                            tracing::warn!("Failed to send {:?}: {}", envelope.kind(), e);
                            if result.is_ok() {
                                result = Err(e);
                            }
                        }
                    }
                    Action::CloseTransport => {
                        if let Err(e) = self.transport.close().await {
                            tracing::debug!("Transport close: {}", e);
                        }
                    }
                    Action::Emit(event) => emitted.push(event),
                }
            }
        }

        for event in &emitted {
            if let SessionEvent::Disconnected { reason } = event {
                tracing::info!("Session {:?} closed: {}", self.config.name, reason);
            }
            dispatch(self.observer.as_ref(), event);
        }

        result
    }

    async fn send_envelope(&self, envelope: &Envelope) -> Result<(), ClientError> {
        self.transport.send(&envelope.encode()?).await?;
        Ok(())
    }
}
