//! Envelope routing.
//!
//! [`RelayEngine::handle`] takes one decoded envelope from a connection and
//! performs whatever registration, forwarding and replies it calls for.
//! Replies always go to the originating connection; forwards go to the
//! handle registered under the envelope's receiver. Every send is a
//! non-blocking push onto the target's outbound queue.

use crate::directory::{ConnectionHandle, Directory};
use crate::server::RelayMetrics;
use courier_types::{Envelope, EnvelopeKind, SystemToken, WarningCode, BROADCAST};
use std::sync::Arc;

/// What the connection loop should do after an envelope was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// The client asked to leave; close the connection.
    Close,
}

/// Routes envelopes between registered connections.
#[derive(Debug, Clone)]
pub struct RelayEngine {
    directory: Arc<Directory>,
    metrics: Arc<RelayMetrics>,
    identity: String,
    require_declaration: bool,
}

impl RelayEngine {
    /// Create an engine over `directory`, signing relay envelopes as `identity`.
    pub fn new(directory: Arc<Directory>, metrics: Arc<RelayMetrics>, identity: &str) -> Self {
        Self {
            directory,
            metrics,
            identity: identity.to_string(),
            require_declaration: false,
        }
    }

    /// Refuse transfers from connections that have not declared.
    pub fn require_declaration(mut self, required: bool) -> Self {
        self.require_declaration = required;
        self
    }

    /// Name used as emitter on relay-originated envelopes.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Handle one envelope received from `origin`.
    pub async fn handle(&self, origin: &ConnectionHandle, envelope: Envelope) -> Flow {
        match envelope.kind() {
            EnvelopeKind::Declaration => {
                self.on_declaration(origin, &envelope).await;
                Flow::Continue
            }
            EnvelopeKind::Transfer => {
                self.on_transfer(origin, &envelope).await;
                Flow::Continue
            }
            EnvelopeKind::SystemControl => self.on_system(origin, &envelope).await,
            EnvelopeKind::Delivery | EnvelopeKind::Warning => {
                tracing::debug!(
                    "Ignoring client-sent {:?} from {:?}",
                    envelope.kind(),
                    envelope.emitter()
                );
                Flow::Continue
            }
        }
    }

    /// Send `code` back to `origin`, addressed to `receiver`.
    pub fn warn(&self, origin: &ConnectionHandle, receiver: &str, code: WarningCode) {
        RelayMetrics::incr(&self.metrics.warnings_total);
        origin.send(Envelope::warning(&self.identity, receiver, code));
    }

    async fn on_declaration(&self, origin: &ConnectionHandle, envelope: &Envelope) {
        let name = envelope.emitter();
        RelayMetrics::incr(&self.metrics.declarations_total);

        match self.directory.register(name, origin.clone()).await {
            Some(previous) if previous.id() != origin.id() => {
                tracing::info!(
                    "Name {:?} redeclared by connection {} (was {})",
                    name,
                    origin.id(),
                    previous.id()
                );
            }
            Some(_) => tracing::debug!("Name {:?} redeclared by same connection", name),
            None => tracing::info!("Registered {:?} on connection {}", name, origin.id()),
        }

        origin.send(Envelope::declaration_received(&self.identity, name));
    }

    async fn on_transfer(&self, origin: &ConnectionHandle, envelope: &Envelope) {
        let emitter = envelope.emitter();
        let receiver = envelope.receiver();
        let value = envelope.payload().unwrap_or_default();
        RelayMetrics::incr(&self.metrics.transfers_total);

        if self.require_declaration && !self.directory.is_owned_by(emitter, origin.id()).await {
            tracing::debug!("Transfer from undeclared {:?} refused", emitter);
            self.warn(origin, emitter, WarningCode::NotDeclared);
            return;
        }

        if envelope.is_broadcast() {
            let mut fanout = 0u64;
            self.directory
                .for_each(|name, handle| {
                    if name != emitter && handle.send(Envelope::delivery(emitter, name, value)) {
                        fanout += 1;
                    }
                })
                .await;
            self.metrics
                .deliveries_total
                .fetch_add(fanout, std::sync::atomic::Ordering::Relaxed);
            tracing::debug!("Broadcast from {:?} to {} endpoints", emitter, fanout);
            origin.send(Envelope::system(&self.identity, emitter, SystemToken::Ok));
            return;
        }

        match self.directory.lookup(receiver).await {
            Some(target) => {
                tracing::debug!("Routing {:?} -> {:?}", emitter, receiver);
                if target.send(Envelope::delivery(emitter, receiver, value)) {
                    RelayMetrics::incr(&self.metrics.deliveries_total);
                }
                origin.send(Envelope::system(&self.identity, emitter, SystemToken::Ok));
            }
            None => {
                tracing::debug!("Receiver {:?} not found for {:?}", receiver, emitter);
                self.warn(origin, emitter, WarningCode::ReceiverNotFound);
            }
        }
    }

    async fn on_system(&self, origin: &ConnectionHandle, envelope: &Envelope) -> Flow {
        let emitter = envelope.emitter();
        let token = envelope.system_token().unwrap_or(SystemToken::Other(String::new()));

        match token {
            SystemToken::Disconnect => {
                if self.directory.remove_if_owned(emitter, origin.id()).await {
                    tracing::info!("{:?} disconnected", emitter);
                }
                Flow::Close
            }
            SystemToken::Pong => {
                if !self.directory.clear_awaiting(emitter, origin.id()).await {
                    tracing::debug!(
                        "Pong for {:?} from connection {} that does not hold it",
                        emitter,
                        origin.id()
                    );
                }
                Flow::Continue
            }
            SystemToken::MessageOk => {
                let original = envelope.receiver();
                match self.directory.lookup(original).await {
                    Some(target) => {
                        tracing::debug!("Acknowledgment {:?} -> {:?}", emitter, original);
                        target.send(Envelope::system(
                            emitter,
                            original,
                            SystemToken::MessageReceived,
                        ));
                    }
                    None => self.warn(origin, emitter, WarningCode::ReceiverNotFound),
                }
                Flow::Continue
            }
            other => {
                tracing::debug!("Ignoring control token {:?} from {:?}", other.as_str(), emitter);
                Flow::Continue
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::{MediaKind, Payload, DECLARATION_RECEIVED};
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc::Receiver;

    struct Harness {
        engine: RelayEngine,
        directory: Arc<Directory>,
        metrics: Arc<RelayMetrics>,
    }

    impl Harness {
        fn new() -> Self {
            let directory = Arc::new(Directory::new());
            let metrics = Arc::new(RelayMetrics::default());
            let engine = RelayEngine::new(Arc::clone(&directory), Arc::clone(&metrics), "SERVER");
            Self {
                engine,
                directory,
                metrics,
            }
        }

        async fn declared(&self, name: &str) -> (ConnectionHandle, Receiver<Envelope>) {
            let (handle, mut rx) = ConnectionHandle::channel(16);
            self.engine
                .handle(&handle, Envelope::declaration(name))
                .await;
            // Swallow the declaration receipt
            assert_eq!(
                next(&mut rx),
                Some(Envelope::declaration_received("SERVER", name))
            );
            (handle, rx)
        }
    }

    fn next(rx: &mut Receiver<Envelope>) -> Option<Envelope> {
        rx.try_recv().ok()
    }

    #[tokio::test]
    async fn declaration_registers_and_acknowledges() {
        let h = Harness::new();
        let (handle, mut rx) = ConnectionHandle::channel(4);

        let flow = h.engine.handle(&handle, Envelope::declaration("alice")).await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(h.directory.lookup("alice").await.unwrap().id(), handle.id());
        let reply = next(&mut rx).unwrap();
        assert_eq!(reply.kind(), EnvelopeKind::Delivery);
        assert_eq!(reply.emitter(), "SERVER");
        assert_eq!(reply.receiver(), "alice");
        assert_eq!(reply.payload(), Some(DECLARATION_RECEIVED));
    }

    #[tokio::test]
    async fn transfer_to_registered_receiver() {
        let h = Harness::new();
        let (a, mut a_rx) = h.declared("A").await;
        let (_b, mut b_rx) = h.declared("B").await;

        let payload = Payload::Text("hello".into());
        h.engine
            .handle(&a, Envelope::transfer("A", "B", &payload))
            .await;

        assert_eq!(next(&mut b_rx), Some(Envelope::delivery("A", "B", "hello")));
        assert!(next(&mut b_rx).is_none());
        assert_eq!(
            next(&mut a_rx),
            Some(Envelope::system("SERVER", "A", SystemToken::Ok))
        );
        assert!(next(&mut a_rx).is_none());
        assert_eq!(h.metrics.deliveries_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn transfer_to_unknown_receiver_warns_once() {
        let h = Harness::new();
        let (a, mut a_rx) = h.declared("A").await;
        let (_b, mut b_rx) = h.declared("B").await;

        h.engine
            .handle(&a, Envelope::transfer("A", "Ghost", &Payload::Text("x".into())))
            .await;

        let warning = next(&mut a_rx).unwrap();
        assert_eq!(warning.kind(), EnvelopeKind::Warning);
        assert!(warning.payload().unwrap().contains("not found"));
        assert!(next(&mut a_rx).is_none());
        assert!(next(&mut b_rx).is_none());
        assert_eq!(h.metrics.warnings_total.load(Ordering::Relaxed), 1);
        assert_eq!(h.metrics.deliveries_total.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn media_payload_is_forwarded_verbatim() {
        let h = Harness::new();
        let (a, _a_rx) = h.declared("A").await;
        let (_b, mut b_rx) = h.declared("B").await;

        let payload = Payload::media(MediaKind::Audio, vec![0, 1, 2, 250]);
        h.engine
            .handle(&a, Envelope::transfer("A", "B", &payload))
            .await;

        let delivered = next(&mut b_rx).unwrap();
        assert_eq!(
            Payload::parse(delivered.payload().unwrap()).unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn broadcast_skips_emitter() {
        let h = Harness::new();
        let (a, mut a_rx) = h.declared("A").await;
        let (_b, mut b_rx) = h.declared("B").await;
        let (_c, mut c_rx) = h.declared("C").await;

        h.engine
            .handle(&a, Envelope::transfer("A", BROADCAST, &Payload::Text("hi all".into())))
            .await;

        assert_eq!(next(&mut b_rx), Some(Envelope::delivery("A", "B", "hi all")));
        assert_eq!(next(&mut c_rx), Some(Envelope::delivery("A", "C", "hi all")));
        assert_eq!(
            next(&mut a_rx),
            Some(Envelope::system("SERVER", "A", SystemToken::Ok))
        );
        assert!(next(&mut a_rx).is_none());
        assert_eq!(h.metrics.deliveries_total.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn message_ok_is_forwarded_as_receipt() {
        let h = Harness::new();
        let (_a, mut a_rx) = h.declared("A").await;
        let (b, mut b_rx) = h.declared("B").await;

        h.engine.handle(&b, Envelope::message_ok("B", "A")).await;

        assert_eq!(
            next(&mut a_rx),
            Some(Envelope::system("B", "A", SystemToken::MessageReceived))
        );
        assert!(next(&mut b_rx).is_none());
    }

    #[tokio::test]
    async fn message_ok_for_departed_sender_warns() {
        let h = Harness::new();
        let (b, mut b_rx) = h.declared("B").await;

        h.engine.handle(&b, Envelope::message_ok("B", "A")).await;

        let warning = next(&mut b_rx).unwrap();
        assert_eq!(
            WarningCode::from_payload(warning.payload().unwrap()),
            Some(WarningCode::ReceiverNotFound)
        );
    }

    #[tokio::test]
    async fn disconnect_removes_only_own_entry() {
        let h = Harness::new();
        let (old, _old_rx) = h.declared("A").await;
        let (new, _new_rx) = h.declared("A").await;

        // Stale connection leaving must not unregister the replacement
        assert_eq!(h.engine.handle(&old, Envelope::disconnect("A")).await, Flow::Close);
        assert_eq!(h.directory.lookup("A").await.unwrap().id(), new.id());

        assert_eq!(h.engine.handle(&new, Envelope::disconnect("A")).await, Flow::Close);
        assert!(h.directory.lookup("A").await.is_none());
    }

    #[tokio::test]
    async fn pong_clears_awaiting_flag() {
        let h = Harness::new();
        let (a, _a_rx) = h.declared("A").await;
        let (_b, _b_rx) = h.declared("B").await;

        h.directory.mark_all_awaiting().await;
        h.engine.handle(&a, Envelope::pong("A")).await;

        let evicted: Vec<String> = h
            .directory
            .evict_unresponsive()
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(evicted, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn pong_from_superseded_connection_does_not_keep_name_alive() {
        let h = Harness::new();
        let (old, _old_rx) = h.declared("A").await;
        let (new, _new_rx) = h.declared("A").await;

        h.directory.mark_all_awaiting().await;
        // Only the old socket is still answering
        h.engine.handle(&old, Envelope::pong("A")).await;

        let evicted = h.directory.evict_unresponsive().await;
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "A");
        assert_eq!(evicted[0].1.id(), new.id());
    }

    #[tokio::test]
    async fn client_sent_delivery_and_warning_are_ignored() {
        let h = Harness::new();
        let (a, mut a_rx) = h.declared("A").await;
        let (_b, mut b_rx) = h.declared("B").await;

        h.engine.handle(&a, Envelope::delivery("A", "B", "x")).await;
        h.engine
            .handle(&a, Envelope::warning("A", "B", WarningCode::RateLimited))
            .await;
        h.engine
            .handle(&a, Envelope::system("A", "B", SystemToken::Other("hello".into())))
            .await;

        assert!(next(&mut a_rx).is_none());
        assert!(next(&mut b_rx).is_none());
    }

    #[tokio::test]
    async fn undeclared_transfer_is_routed_by_default() {
        let h = Harness::new();
        let (_b, mut b_rx) = h.declared("B").await;
        let (anon, _anon_rx) = ConnectionHandle::channel(4);

        h.engine
            .handle(&anon, Envelope::transfer("anon", "B", &Payload::Text("x".into())))
            .await;
        assert_eq!(next(&mut b_rx), Some(Envelope::delivery("anon", "B", "x")));
    }

    #[tokio::test]
    async fn undeclared_transfer_refused_when_required() {
        let mut h = Harness::new();
        h.engine = h.engine.clone().require_declaration(true);
        let (_b, mut b_rx) = h.declared("B").await;
        let (anon, mut anon_rx) = ConnectionHandle::channel(4);

        h.engine
            .handle(&anon, Envelope::transfer("anon", "B", &Payload::Text("x".into())))
            .await;

        let warning = next(&mut anon_rx).unwrap();
        assert_eq!(
            WarningCode::from_payload(warning.payload().unwrap()),
            Some(WarningCode::NotDeclared)
        );
        assert!(next(&mut b_rx).is_none());
    }
}
