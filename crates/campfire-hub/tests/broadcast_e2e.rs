//! End-to-end tests: a real listener, real WebSocket clients.
//!
//! Each test binds port 0, serves with its own hub, and connects with
//! `tokio_tungstenite::connect_async`.  They check the behaviour a client can
//! observe on the wire:
//!
//! - Every member receives each admitted message exactly once.
//! - Bad frames are dropped without closing the connection.
//! - The verified identity replaces a forged `senderID`.
//! - Disconnecting removes the member.
//! - Rate limiting and echo settings take effect.
//! - Oversized frames and idle peers are disconnected.

use std::net::SocketAddr;
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use campfire_hub::application::Hub;
use campfire_hub::domain::{HubConfig, RateLimitPolicy};
use campfire_hub::infrastructure::serve;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Helpers ───────────────────────────────────────────────────────────────────

struct TestServer {
    addr: SocketAddr,
    hub: Hub,
    running: Arc<AtomicBool>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.running.store(false, std::sync::atomic::Ordering::Relaxed);
    }
}

async fn start(config: HubConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::spawn(&config);
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(serve(listener, config, hub.clone(), Arc::clone(&running)));
    TestServer { addr, hub, running }
}

async fn connect(server: &TestServer, identity: Option<&'static str>) -> Client {
    let mut request = format!("ws://{}/ws", server.addr).into_client_request().unwrap();
    if let Some(identity) = identity {
        request
            .headers_mut()
            .insert("x-authenticated-user", HeaderValue::from_static(identity));
    }
    let (ws, _response) = connect_async(request).await.unwrap();
    ws
}

/// Waits until the hub reports `n` members.
async fn wait_for_members(hub: &Hub, n: usize) {
    for _ in 0..200 {
        if hub.members().await.len() == n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("hub never reached {n} members (has {})", hub.member_count());
}

async fn send(client: &mut Client, json: &str) {
    client.send(WsMessage::Text(json.to_string())).await.unwrap();
}

/// Next text frame as JSON, or `None` if nothing arrives within `wait`.
async fn recv_within(client: &mut Client, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, client.next()).await.ok()??;
        match frame {
            Ok(WsMessage::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn recv(client: &mut Client) -> Value {
    recv_within(client, Duration::from_secs(2))
        .await
        .expect("expected a broadcast")
}

const QUIET: Duration = Duration::from_millis(150);

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_clients_each_receive_message_exactly_once() {
    // Arrange
    let server = start(HubConfig::default()).await;
    let mut a = connect(&server, None).await;
    let mut b = connect(&server, None).await;
    let mut c = connect(&server, None).await;
    wait_for_members(&server.hub, 3).await;

    // Act
    send(&mut a, r#"{"senderID":"u1","content":"hi"}"#).await;

    // Assert: A (echo), B and C each get it once.
    for client in [&mut a, &mut b, &mut c] {
        let msg = recv(client).await;
        assert_eq!(msg["senderID"], "u1");
        assert_eq!(msg["content"], "hi");
        assert!(msg["createdAt"].is_string());
        assert!(recv_within(client, QUIET).await.is_none(), "duplicate delivery");
    }
}

#[tokio::test]
async fn test_all_recipients_see_the_same_id() {
    let server = start(HubConfig::default()).await;
    let mut a = connect(&server, None).await;
    let mut b = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;

    send(&mut a, r#"{"senderID":"u1","content":"one"}"#).await;
    let first_a = recv(&mut a).await;
    let first_b = recv(&mut b).await;
    send(&mut a, r#"{"senderID":"u1","content":"two"}"#).await;
    let second_a = recv(&mut a).await;

    assert_eq!(first_a["id"], first_b["id"]);
    assert!(second_a["id"].as_u64().unwrap() > first_a["id"].as_u64().unwrap());
}

#[tokio::test]
async fn test_bad_frames_are_dropped_and_connection_survives() {
    let server = start(HubConfig::default()).await;
    let mut a = connect(&server, None).await;
    let mut b = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;

    send(&mut a, "{ this is not json").await;
    send(&mut a, r#"{"senderID":"u1","content":""}"#).await;
    send(&mut a, &format!(r#"{{"senderID":"u1","content":"{}"}}"#, "x".repeat(1001))).await;
    send(&mut a, r#"{"senderID":"u1","content":"valid"}"#).await;

    // Only the valid message reaches B.
    assert_eq!(recv(&mut b).await["content"], "valid");
    assert!(recv_within(&mut b, QUIET).await.is_none());
    assert_eq!(server.hub.members().await.len(), 2);
}

#[tokio::test]
async fn test_verified_identity_replaces_forged_sender() {
    let server = start(HubConfig::default()).await;
    let mut alice = connect(&server, Some("alice")).await;
    let mut observer = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;

    send(&mut alice, r#"{"senderID":"bob","content":"it's me, bob"}"#).await;

    assert_eq!(recv(&mut observer).await["senderID"], "alice");
}

#[tokio::test]
async fn test_disconnect_removes_member_and_others_keep_receiving() {
    let server = start(HubConfig::default()).await;
    let mut a = connect(&server, None).await;
    let mut b = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;

    b.close(None).await.unwrap();
    wait_for_members(&server.hub, 1).await;

    send(&mut a, r#"{"senderID":"u1","content":"anyone?"}"#).await;
    assert_eq!(recv(&mut a).await["content"], "anyone?");
}

#[tokio::test]
async fn test_echo_disabled_skips_sender() {
    let config = HubConfig {
        echo_to_sender: false,
        ..HubConfig::default()
    };
    let server = start(config).await;
    let mut a = connect(&server, None).await;
    let mut b = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;

    send(&mut a, r#"{"senderID":"u1","content":"hi"}"#).await;

    assert_eq!(recv(&mut b).await["content"], "hi");
    assert!(recv_within(&mut a, QUIET).await.is_none());
}

#[tokio::test]
async fn test_drop_policy_sheds_frames_beyond_burst() {
    // Arrange: burst of 2 and a refill interval far longer than the test.
    let mut config = HubConfig::default();
    config.rate_limit.policy = RateLimitPolicy::Drop;
    config.rate_limit.burst = 2;
    config.rate_limit.interval = Duration::from_secs(60);
    let server = start(config).await;
    let mut a = connect(&server, None).await;
    let mut b = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;

    // Act
    for i in 0..5 {
        send(&mut a, &format!(r#"{{"senderID":"u1","content":"m{i}"}}"#)).await;
    }

    // Assert: exactly the first two get through.
    assert_eq!(recv(&mut b).await["content"], "m0");
    assert_eq!(recv(&mut b).await["content"], "m1");
    assert!(recv_within(&mut b, QUIET).await.is_none());
}

#[tokio::test]
async fn test_idle_connection_is_closed_after_read_timeout() {
    let config = HubConfig {
        read_timeout: Duration::from_millis(200),
        ..HubConfig::default()
    };
    let server = start(config).await;
    let mut idle = connect(&server, None).await;
    wait_for_members(&server.hub, 1).await;

    // The hub closes the connection with a Close frame.
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match idle.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;

    assert!(closed.is_ok());
    wait_for_members(&server.hub, 0).await;
}

#[tokio::test]
async fn test_oversized_frame_closes_only_its_connection() {
    let server = start(HubConfig::default()).await;
    let mut big = connect(&server, None).await;
    let mut other = connect(&server, None).await;
    wait_for_members(&server.hub, 2).await;
    let limit = HubConfig::default().max_frame_bytes();

    let huge = format!(r#"{{"senderID":"u1","content":"{}"}}"#, "x".repeat(limit * 2));
    let _ = big.send(WsMessage::Text(huge)).await;

    // The oversized sender is removed; the other member keeps working.
    wait_for_members(&server.hub, 1).await;
    assert!(recv_within(&mut other, QUIET).await.is_none());
    send(&mut other, r#"{"senderID":"u2","content":"still here"}"#).await;
    assert_eq!(recv(&mut other).await["content"], "still here");
}
