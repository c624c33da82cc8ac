//! End-to-end tests: real relay, real WebSocket clients.

use courier_client::{
    ChannelObserver, ClientConfig, RelayClient, SessionEvent, WebSocketTransport,
};
use courier_relay::{Config, CourierRelay, LivenessMonitor, RelayListener};
use courier_types::{Envelope, EnvelopeKind, Payload, SystemToken, WarningCode, DECLARATION_RECEIVED};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const WAIT: Duration = Duration::from_secs(5);

type Client = Arc<RelayClient<WebSocketTransport>>;

async fn start_relay() -> (Arc<CourierRelay>, SocketAddr) {
    let mut config = Config::default();
    config.heartbeat.enabled = false;
    let relay = Arc::new(CourierRelay::new(config).unwrap());

    let listener = RelayListener::bind(Arc::clone(&relay), "127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.serve(std::future::pending()));
    (relay, addr)
}

/// Connect a client, start its receive loop, and wait for the relay's receipt.
async fn join(addr: SocketAddr, name: &str) -> (Client, UnboundedReceiver<SessionEvent>) {
    let (observer, mut events) = ChannelObserver::new();
    let client = Arc::new(RelayClient::new(
        ClientConfig::new(&format!("ws://{addr}"), name),
        WebSocketTransport::new(),
        Arc::new(observer),
    ));
    client.connect().await.unwrap();

    let runner = Arc::clone(&client);
    tokio::spawn(async move { runner.run().await });

    expect(&mut events, |e| {
        matches!(e, SessionEvent::System { token: SystemToken::Other(t) } if t == DECLARATION_RECEIVED)
    })
    .await;
    (client, events)
}

/// Wait for the first event matching `pred`, skipping others.
async fn expect<F>(events: &mut UnboundedReceiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("observer channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn hello_with_two_layer_acknowledgment() {
    let (relay, addr) = start_relay().await;
    let (alice, mut alice_events) = join(addr, "A").await;
    let (_bob, mut bob_events) = join(addr, "B").await;
    assert_eq!(relay.directory().len().await, 2);

    alice.send("hello", "B").await.unwrap();

    let delivered = expect(&mut bob_events, |e| matches!(e, SessionEvent::Delivery { .. })).await;
    assert_eq!(
        delivered,
        SessionEvent::Delivery {
            emitter: "A".into(),
            receiver: "B".into(),
            payload: Payload::Text("hello".into()),
        }
    );

    // Relay receipt, then the receiver's acknowledgment
    expect(&mut alice_events, |e| {
        matches!(e, SessionEvent::System { token: SystemToken::Ok })
    })
    .await;
    expect(&mut alice_events, |e| {
        matches!(e, SessionEvent::System { token: SystemToken::MessageReceived })
    })
    .await;
}

#[tokio::test]
async fn media_transfer_arrives_intact() {
    let (_relay, addr) = start_relay().await;
    let (alice, _alice_events) = join(addr, "A").await;
    let (_bob, mut bob_events) = join(addr, "B").await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voice.ogg");
    let bytes: Vec<u8> = (0..=255).collect();
    std::fs::write(&path, &bytes).unwrap();

    alice
        .send_media(courier_types::MediaKind::Audio, &path, "B")
        .await
        .unwrap();

    let event = expect(&mut bob_events, |e| matches!(e, SessionEvent::Delivery { .. })).await;
    let SessionEvent::Delivery { payload, .. } = event else {
        unreachable!()
    };
    assert_eq!(payload, Payload::media(courier_types::MediaKind::Audio, bytes));
}

#[tokio::test]
async fn ghost_receiver_yields_warning() {
    let (_relay, addr) = start_relay().await;
    let (alice, mut alice_events) = join(addr, "A").await;

    alice.send("anyone?", "Ghost").await.unwrap();

    let warning = expect(&mut alice_events, |e| matches!(e, SessionEvent::Warning { .. })).await;
    let SessionEvent::Warning { text, code } = warning else {
        unreachable!()
    };
    assert!(text.contains("not found"));
    assert_eq!(code, Some(WarningCode::ReceiverNotFound));
}

#[tokio::test]
async fn broadcast_reaches_everyone_else() {
    let (_relay, addr) = start_relay().await;
    let (alice, mut alice_events) = join(addr, "A").await;
    let (_bob, mut bob_events) = join(addr, "B").await;
    let (_carol, mut carol_events) = join(addr, "C").await;

    alice.send("hi all", "ALL").await.unwrap();

    for events in [&mut bob_events, &mut carol_events] {
        let event = expect(events, |e| matches!(e, SessionEvent::Delivery { .. })).await;
        assert!(matches!(
            event,
            SessionEvent::Delivery { ref emitter, .. } if emitter == "A"
        ));
    }
    expect(&mut alice_events, |e| {
        matches!(e, SessionEvent::System { token: SystemToken::Ok })
    })
    .await;
}

#[tokio::test]
async fn disconnect_unregisters() {
    let (relay, addr) = start_relay().await;
    let (alice, _events) = join(addr, "A").await;
    assert!(relay.directory().lookup("A").await.is_some());

    alice.disconnect().await.unwrap();

    tokio::time::timeout(WAIT, async {
        while relay.directory().lookup("A").await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("name should be released");
}

#[tokio::test]
async fn heartbeat_evicts_silent_and_keeps_responsive() {
    let (relay, addr) = start_relay().await;
    let (_alice, _events) = join(addr, "A").await;

    // A raw socket that declares and then never answers pings
    let (mut silent, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();
    silent
        .send(WsMessage::Text(
            Envelope::declaration("silent").encode_text().unwrap(),
        ))
        .await
        .unwrap();
    let receipt = silent.next().await.unwrap().unwrap();
    assert!(receipt.to_text().unwrap().contains(DECLARATION_RECEIVED));

    let monitor = LivenessMonitor::new(
        Arc::clone(relay.directory()),
        Arc::new(courier_relay::RelayMetrics::default()),
        "SERVER",
        Duration::from_millis(500),
    );
    let evicted = monitor.run_cycle().await;

    assert_eq!(evicted, vec!["silent".to_string()]);
    assert!(relay.directory().lookup("A").await.is_some());

    // The silent socket saw the ping, then the relay closed it
    let ping = silent.next().await.unwrap().unwrap();
    let ping = Envelope::decode(ping.to_text().unwrap().as_bytes()).unwrap();
    assert_eq!(ping.kind(), EnvelopeKind::SystemControl);
    assert_eq!(ping.system_token(), Some(SystemToken::Ping));

    let end = tokio::time::timeout(WAIT, silent.next()).await.unwrap();
    assert!(matches!(end, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))));
}
