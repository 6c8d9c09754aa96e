//! Relay Streaming Integration Tests
//!
//! Runs the relay against a fake AISStream server on loopback and checks
//! what real WebSocket viewers receive.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use ais_relay::{ApiKey, ClientRegistry, FeedState, Relay, RelayConfig, RelayError};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Fake upstream
// =============================================================================

struct UpstreamConn {
    subscription: Value,
    ws: WebSocketStream<TcpStream>,
    accepted_at: Instant,
}

impl UpstreamConn {
    async fn send_text(&mut self, text: &str) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    async fn send_json(&mut self, value: &Value) {
        self.send_text(&value.to_string()).await;
    }
}

struct FakeUpstream {
    addr: SocketAddr,
    conns: mpsc::UnboundedReceiver<UpstreamConn>,
}

impl FakeUpstream {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, conns) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let accepted_at = Instant::now();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let first = ws.next().await.unwrap().unwrap();
                let subscription: Value = serde_json::from_str(first.to_text().unwrap()).unwrap();
                if tx
                    .send(UpstreamConn {
                        subscription,
                        ws,
                        accepted_at,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self { addr, conns }
    }

    async fn next_conn(&mut self) -> UpstreamConn {
        timeout(WAIT, self.conns.recv()).await.unwrap().unwrap()
    }
}

// =============================================================================
// Relay and viewers
// =============================================================================

struct RunningRelay {
    addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    feed_state: Arc<FeedState>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), RelayError>>,
}

impl RunningRelay {
    async fn start(upstream: SocketAddr, reconnect_delay: Duration) -> Self {
        let mut config = RelayConfig::new(ApiKey::new("test-key"));
        config.upstream.url = format!("ws://{upstream}");
        config.server.bind_host = Ipv4Addr::LOCALHOST.into();
        config.server.relay_port = 0;
        config.server.health_port = 0;
        config.reconnect.delay_initial = reconnect_delay;
        config.reconnect.delay_max = reconnect_delay;

        let relay = Relay::bind(config).await.unwrap();
        let addr = relay.local_addr();
        let registry = Arc::clone(relay.registry());
        let feed_state = Arc::clone(relay.feed_state());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(relay.run(cancel.clone()));

        Self {
            addr,
            registry,
            feed_state,
            cancel,
            task,
        }
    }

    async fn wait_for_viewers(&self, count: usize) {
        timeout(WAIT, async {
            while self.registry.len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn stop(self) {
        self.cancel.cancel();
        timeout(WAIT, self.task).await.unwrap().unwrap().unwrap();
    }
}

type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_viewer(addr: SocketAddr) -> Viewer {
    let (mut viewer, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/any/path"))
        .await
        .unwrap();
    assert_eq!(
        next_json(&mut viewer).await,
        json!({"type": "status", "message": "Connected to local relay"})
    );
    viewer
}

async fn next_json(viewer: &mut Viewer) -> Value {
    loop {
        let message = timeout(WAIT, viewer.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Read until the next `ais` envelope, returning the status messages seen
/// on the way.
async fn next_ais(viewer: &mut Viewer) -> (Value, Vec<String>) {
    let mut statuses = Vec::new();
    loop {
        let envelope = next_json(viewer).await;
        match envelope["type"].as_str() {
            Some("ais") => return (envelope["payload"].clone(), statuses),
            Some("status") => statuses.push(envelope["message"].as_str().unwrap().to_string()),
            other => panic!("unexpected envelope type {other:?}"),
        }
    }
}

/// Raw text of the next `ais` envelope.
async fn next_ais_text(viewer: &mut Viewer) -> String {
    loop {
        let message = timeout(WAIT, viewer.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = message
            && text.as_str().starts_with(r#"{"type":"ais""#)
        {
            return text.as_str().to_string();
        }
    }
}

fn position_report(user_id: u64) -> Value {
    json!({
        "MessageType": "PositionReport",
        "Message": {
            "PositionReport": {
                "UserID": user_id,
                "Latitude": 40.70,
                "Longitude": -74.00
            }
        },
        "MetaData": {"ShipName": "TEST VESSEL"}
    })
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn subscription_is_first_frame_and_sent_once() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut conn = upstream.next_conn().await;
    assert_eq!(
        conn.subscription,
        json!({
            "APIKey": "test-key",
            "BoundingBoxes": [[[40.55, -74.30], [40.90, -73.60]]],
            "FilterMessageTypes": ["PositionReport"]
        })
    );

    let second = timeout(Duration::from_millis(300), conn.ws.next()).await;
    assert!(second.is_err(), "relay sent more than one upstream frame");

    relay.stop().await;
}

#[tokio::test]
async fn position_report_is_relayed_verbatim_to_every_viewer() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut first = connect_viewer(relay.addr).await;
    let mut second = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(2).await;

    let mut conn = upstream.next_conn().await;
    let report = position_report(123_456_789);
    conn.send_json(&report).await;

    for viewer in [&mut first, &mut second] {
        let (payload, _) = next_ais(viewer).await;
        assert_eq!(payload, report);
    }

    relay.stop().await;
}

#[tokio::test]
async fn payload_text_is_relayed_unchanged() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut viewer = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(1).await;

    let raw = r#"{"MetaData":{"ShipName":"TEST VESSEL","MMSI":368000000},"MessageType":"PositionReport","Message":{"PositionReport":{"UserID":368000000,"Longitude":-74.01,"Latitude":40.7}}}"#;
    let mut conn = upstream.next_conn().await;
    conn.send_text(raw).await;

    assert_eq!(
        next_ais_text(&mut viewer).await,
        format!(r#"{{"type":"ais","payload":{raw}}}"#)
    );

    relay.stop().await;
}

#[tokio::test]
async fn frames_arrive_in_upstream_order() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut viewers = vec![
        connect_viewer(relay.addr).await,
        connect_viewer(relay.addr).await,
        connect_viewer(relay.addr).await,
    ];
    relay.wait_for_viewers(3).await;

    let mut conn = upstream.next_conn().await;
    for n in 0..50_u64 {
        conn.send_json(&position_report(n)).await;
    }

    for viewer in &mut viewers {
        for n in 0..50_u64 {
            let (payload, _) = next_ais(viewer).await;
            assert_eq!(payload["Message"]["PositionReport"]["UserID"], n);
        }
    }

    relay.stop().await;
}

#[tokio::test]
async fn malformed_frames_are_never_broadcast() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut viewer = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(1).await;

    let mut conn = upstream.next_conn().await;
    conn.send_text("not json").await;
    conn.send_text("{\"MessageType\": ").await;
    conn.send_text("[1, 2, 3]").await;
    conn.ws
        .send(Message::Binary(vec![0xff, 0xfe, 0x00].into()))
        .await
        .unwrap();
    let report = position_report(42);
    conn.send_json(&report).await;

    let (payload, statuses) = next_ais(&mut viewer).await;
    assert_eq!(payload, report);
    assert!(
        statuses.iter().all(|s| s == "Subscribed to AISStream"),
        "unexpected statuses: {statuses:?}"
    );
    assert_eq!(relay.feed_state.get_decode_errors(), 4);
    assert_eq!(relay.feed_state.get_messages_received(), 1);

    relay.stop().await;
}

#[tokio::test]
async fn binary_json_frames_are_relayed() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut viewer = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(1).await;

    let mut conn = upstream.next_conn().await;
    let report = position_report(7);
    conn.ws
        .send(Message::Binary(report.to_string().into_bytes().into()))
        .await
        .unwrap();

    let (payload, _) = next_ais(&mut viewer).await;
    assert_eq!(payload, report);

    relay.stop().await;
}

#[tokio::test]
async fn upstream_close_is_announced_before_resumed_frames() {
    let reconnect_delay = Duration::from_millis(300);
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, reconnect_delay).await;

    let mut viewer = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(1).await;

    let mut conn = upstream.next_conn().await;
    conn.send_json(&position_report(1)).await;
    let (payload, _) = next_ais(&mut viewer).await;
    assert_eq!(payload["Message"]["PositionReport"]["UserID"], 1);

    let closed_at = Instant::now();
    conn.ws.close(None).await.unwrap();
    drop(conn);

    let mut conn = upstream.next_conn().await;
    assert!(
        conn.accepted_at.duration_since(closed_at) >= reconnect_delay,
        "reconnected after {:?}",
        conn.accepted_at.duration_since(closed_at)
    );
    assert_eq!(conn.subscription["APIKey"], "test-key");

    conn.send_json(&position_report(2)).await;
    let (payload, statuses) = next_ais(&mut viewer).await;
    assert_eq!(payload["Message"]["PositionReport"]["UserID"], 2);

    let disconnected = statuses
        .iter()
        .position(|s| s == "AISStream disconnected, reconnecting...")
        .expect("disconnect status before resumed frames");
    let resubscribed = statuses
        .iter()
        .rposition(|s| s == "Subscribed to AISStream")
        .expect("subscribed status after reconnect");
    assert!(disconnected < resubscribed);

    relay.stop().await;
}

#[tokio::test]
async fn closed_viewer_is_deregistered() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut leaving = connect_viewer(relay.addr).await;
    let mut staying = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(2).await;

    leaving.close(None).await.unwrap();
    drop(leaving);
    relay.wait_for_viewers(1).await;

    let mut conn = upstream.next_conn().await;
    let report = position_report(99);
    conn.send_json(&report).await;

    let (payload, _) = next_ais(&mut staying).await;
    assert_eq!(payload, report);

    relay.stop().await;
}

#[tokio::test]
async fn viewer_messages_are_ignored() {
    let mut upstream = FakeUpstream::start().await;
    let relay = RunningRelay::start(upstream.addr, Duration::from_millis(100)).await;

    let mut viewer = connect_viewer(relay.addr).await;
    relay.wait_for_viewers(1).await;
    viewer
        .send(Message::Text("{\"subscribe\": \"everything\"}".into()))
        .await
        .unwrap();

    let mut conn = upstream.next_conn().await;
    let report = position_report(5);
    conn.send_json(&report).await;

    let (payload, _) = next_ais(&mut viewer).await;
    assert_eq!(payload, report);
    assert_eq!(relay.registry.len(), 1);

    relay.stop().await;
}
