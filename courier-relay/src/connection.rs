//! Per-connection handling.
//!
//! Each accepted socket is upgraded to a WebSocket and split in two:
//! a writer task that drains the connection's outbound queue, and a read
//! loop that decodes one envelope per text frame and hands it to the
//! engine. The connection ends when either side stops or when the relay
//! requests a close through the handle.

use crate::directory::ConnectionHandle;
use crate::engine::Flow;
use crate::error::ConnectionError;
use crate::server::{CourierRelay, RelayMetrics};
use courier_types::{Envelope, EnvelopeKind, WarningCode};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};

/// How long the writer gets to flush a close frame once the reader is done.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Serve one accepted socket until it closes.
///
/// Every name the connection registered is removed on the way out, unless
/// another connection has since taken it over.
pub async fn handle_connection<S>(
    relay: Arc<CourierRelay>,
    stream: S,
    peer: SocketAddr,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let limits = &relay.config().limits;
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(limits.max_frame_size);
    ws_config.max_frame_size = Some(limits.max_frame_size);

    let ws = accept_async_with_config(stream, Some(ws_config))
        .await
        .map_err(ConnectionError::Handshake)?;
    RelayMetrics::incr(&relay.metrics().connections_total);

    let (handle, outbound) = ConnectionHandle::channel(relay.config().server.outbound_queue);
    tracing::info!("Connection {} open from {}", handle.id(), peer);

    let (sink, mut source) = ws.split();
    let mut writer = tokio::spawn(write_loop(sink, outbound, handle.clone()));

    let mut writer_done = false;
    let result = tokio::select! {
        result = read_loop(&relay, &handle, &mut source) => result,
        _ = &mut writer => {
            writer_done = true;
            Ok(())
        }
        _ = handle.close_requested() => {
            tracing::info!("Connection {} closed by relay", handle.id());
            Ok(())
        }
    };

    let removed = relay.directory().remove_connection(handle.id()).await;
    if !removed.is_empty() {
        tracing::info!("Connection {} released {:?}", handle.id(), removed);
    }

    if !writer_done {
        handle.close();
        drop(handle);
        if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
    }

    match &result {
        Ok(()) => tracing::info!("Connection from {} closed", peer),
        Err(e) => tracing::info!("Connection from {} closed: {}", peer, e),
    }
    result
}

async fn read_loop<S>(
    relay: &CourierRelay,
    handle: &ConnectionHandle,
    source: &mut SplitStream<WebSocketStream<S>>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let limits = &relay.config().limits;
    let mut declared = false;

    loop {
        let frame = match (declared, limits.declaration_timeout()) {
            (false, Some(timeout)) => match tokio::time::timeout(timeout, source.next()).await {
                Ok(frame) => frame,
                Err(_) => {
                    return Err(ConnectionError::DeclarationTimeout(
                        limits.declaration_timeout_secs,
                    ))
                }
            },
            _ => source.next().await,
        };

        let bytes = match frame {
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Binary(bytes))) => bytes,
            Some(Ok(WsMessage::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        };

        let envelope = match Envelope::decode(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                RelayMetrics::incr(&relay.metrics().malformed_total);
                tracing::warn!("Malformed frame on connection {}: {}", handle.id(), e);
                return Err(e.into());
            }
        };

        match envelope.kind() {
            EnvelopeKind::Declaration => {
                let len = envelope.emitter().len();
                if len > limits.max_name_len {
                    tracing::warn!("Connection {} declared an oversized name", handle.id());
                    return Err(ConnectionError::NameTooLong {
                        len,
                        limit: limits.max_name_len,
                    });
                }
                declared = true;
            }
            EnvelopeKind::Transfer => {
                if let Err(e) = relay.rate_limits().check_message(handle.id()) {
                    tracing::warn!("Connection {}: {}", handle.id(), e);
                    RelayMetrics::incr(&relay.metrics().rate_limit_hits);
                    relay
                        .engine()
                        .warn(handle, envelope.emitter(), WarningCode::RateLimited);
                    continue;
                }
            }
            _ => {}
        }

        if relay.engine().handle(handle, envelope).await == Flow::Close {
            return Ok(());
        }
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, WsMessage>,
    mut outbound: mpsc::Receiver<Envelope>,
    handle: ConnectionHandle,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let envelope = tokio::select! {
            envelope = outbound.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
            _ = handle.close_requested() => {
                // Flush what was queued before the close
                while let Ok(envelope) = outbound.try_recv() {
                    if !write_envelope(&mut sink, &envelope, &handle).await {
                        return;
                    }
                }
                break;
            }
        };
        if !write_envelope(&mut sink, &envelope, &handle).await {
            return;
        }
    }

    // Peer may already be gone
    if let Err(e) = sink.close().await {
        tracing::debug!("Connection {}: close: {}", handle.id(), e);
    }
}

/// Write one envelope; `false` once the socket is unusable.
async fn write_envelope<S>(
    sink: &mut SplitSink<WebSocketStream<S>, WsMessage>,
    envelope: &Envelope,
    handle: &ConnectionHandle,
) -> bool
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = match envelope.encode_text() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Connection {}: unencodable envelope: {}", handle.id(), e);
            return true;
        }
    };
    match sink.send(WsMessage::Text(text)).await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Connection {}: send failed: {}", handle.id(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use courier_types::{Payload, SystemToken, DECLARATION_RECEIVED};
    use tokio::io::DuplexStream;

    type Client = WebSocketStream<DuplexStream>;

    fn test_relay(edit: impl FnOnce(&mut Config)) -> Arc<CourierRelay> {
        let mut config = Config::default();
        edit(&mut config);
        Arc::new(CourierRelay::new(config).unwrap())
    }

    /// Connect an in-memory client to a freshly spawned connection handler.
    async fn connect(
        relay: &Arc<CourierRelay>,
    ) -> (Client, tokio::task::JoinHandle<Result<(), ConnectionError>>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let peer: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(handle_connection(Arc::clone(relay), server_io, peer));
        let (client, _) = tokio_tungstenite::client_async("ws://relay.test/", client_io)
            .await
            .unwrap();
        (client, task)
    }

    async fn send(client: &mut Client, envelope: &Envelope) {
        client
            .send(WsMessage::Text(envelope.encode_text().unwrap()))
            .await
            .unwrap();
    }

    async fn recv(client: &mut Client) -> Envelope {
        loop {
            match client.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return Envelope::decode(text.as_bytes()).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn declare_then_disconnect() {
        let relay = test_relay(|_| {});
        let (mut client, task) = connect(&relay).await;

        send(&mut client, &Envelope::declaration("alice")).await;
        let reply = recv(&mut client).await;
        assert_eq!(reply.payload(), Some(DECLARATION_RECEIVED));
        assert_eq!(relay.directory().len().await, 1);

        send(&mut client, &Envelope::disconnect("alice")).await;
        assert!(task.await.unwrap().is_ok());
        assert!(relay.directory().is_empty().await);
    }

    #[tokio::test]
    async fn malformed_frame_drops_connection() {
        let relay = test_relay(|_| {});
        let (mut client, task) = connect(&relay).await;

        client
            .send(WsMessage::Text("not an envelope".into()))
            .await
            .unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Malformed(_))));
        assert_eq!(
            relay
                .metrics()
                .malformed_total
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn dropped_socket_releases_name() {
        let relay = test_relay(|_| {});
        let (mut client, task) = connect(&relay).await;

        send(&mut client, &Envelope::declaration("alice")).await;
        recv(&mut client).await;
        drop(client);

        let _ = task.await.unwrap();
        assert!(relay.directory().lookup("alice").await.is_none());
    }

    #[tokio::test]
    async fn oversized_name_is_refused() {
        let relay = test_relay(|c| c.limits.max_name_len = 4);
        let (mut client, task) = connect(&relay).await;

        send(&mut client, &Envelope::declaration("too-long-name")).await;
        let result = task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::NameTooLong { .. })));
        assert!(relay.directory().is_empty().await);
    }

    #[tokio::test]
    async fn silent_connection_times_out() {
        let relay = test_relay(|c| c.limits.declaration_timeout_secs = 1);
        let (_client, task) = connect(&relay).await;

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ConnectionError::DeclarationTimeout(1))));
    }

    #[tokio::test]
    async fn flooding_connection_gets_rate_limited() {
        let relay = test_relay(|c| c.limits.messages_per_minute = 1);
        let (mut client, _task) = connect(&relay).await;

        send(&mut client, &Envelope::declaration("alice")).await;
        recv(&mut client).await;

        let text = Payload::Text("hi".into());
        send(&mut client, &Envelope::transfer("alice", "alice", &text)).await;
        // Self-addressed: a delivery and the relay OK
        assert_eq!(recv(&mut client).await.kind(), EnvelopeKind::Delivery);
        assert_eq!(
            recv(&mut client).await.system_token(),
            Some(SystemToken::Ok)
        );

        send(&mut client, &Envelope::transfer("alice", "alice", &text)).await;
        let warning = recv(&mut client).await;
        assert_eq!(
            WarningCode::from_payload(warning.payload().unwrap()),
            Some(WarningCode::RateLimited)
        );
    }

    #[tokio::test]
    async fn evicted_connection_with_full_queue_is_closed() {
        let relay = test_relay(|c| {
            c.server.outbound_queue = 1;
            c.heartbeat.ping_timeout_secs = 0;
        });
        let (mut client, task) = connect(&relay).await;

        send(&mut client, &Envelope::declaration("stalled")).await;
        recv(&mut client).await;

        // Stop reading: the queue of one fills up and stays full
        let handle = relay.directory().lookup("stalled").await.unwrap();
        for _ in 0..64 {
            handle.send(Envelope::ping("SERVER"));
        }
        assert!(!handle.send(Envelope::ping("SERVER")));

        let evicted = relay.liveness_monitor().run_cycle().await;
        assert_eq!(evicted, vec!["stalled".to_string()]);

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("evicted connection must end")
            .unwrap();
        assert!(result.is_ok());
        assert!(relay.directory().is_empty().await);
    }

    #[tokio::test]
    async fn declaring_broadcast_token_drops_connection() {
        let relay = test_relay(|_| {});
        let (mut client, task) = connect(&relay).await;

        client
            .send(WsMessage::Text(
                r#"{"message_type":"declaration","data":{"emitter":"ALL","receiver":"","value":null}}"#
                    .into(),
            ))
            .await
            .unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::Malformed(_))));
        assert!(relay.directory().is_empty().await);
    }

    #[tokio::test]
    async fn close_request_ends_connection() {
        let relay = test_relay(|_| {});
        let (mut client, task) = connect(&relay).await;

        send(&mut client, &Envelope::declaration("alice")).await;
        recv(&mut client).await;

        let handle = relay.directory().lookup("alice").await.unwrap();
        relay.directory().remove("alice").await;
        handle.close();

        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());

        // Client sees the socket close
        let end = client.next().await;
        assert!(matches!(end, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))));
    }
}
