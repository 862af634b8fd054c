//! End-to-end integration tests using real WebSocket and HTTP clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use kofi_bridge_core::{RetryConfig, RoutingKey};
use kofi_bridge_server::{BridgeServer, ServerConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

fn test_config() -> ServerConfig {
    ServerConfig {
        heartbeat_interval_secs: 0,
        retry: RetryConfig {
            max_attempts: 3,
            backoff_ms: 10,
        },
        ..ServerConfig::default()
    }
}

/// Boot a test server on an ephemeral port.
async fn boot_server(config: ServerConfig) -> (SocketAddr, BridgeServer) {
    let server = BridgeServer::new(config);
    let (addr, _handle) = server.listen().await.unwrap();
    (addr, server)
}

async fn connect(addr: SocketAddr, token: &str) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/ws/{token}"))
        .await
        .unwrap();
    ws
}

/// Read the next text frame.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.to_string();
        }
    }
}

/// Poll until `cond` holds.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

async fn wait_registered(server: &BridgeServer, token: &str, count: usize) {
    let key = RoutingKey::new(token).unwrap();
    let registry = server.registry().clone();
    wait_until(move || registry.connections(&key).len() == count).await;
}

async fn post_webhook(addr: SocketAddr, data: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/webhook"))
        .form(&[("data", data)])
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap();
    (status, body)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_ping_pong() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = connect(addr, "tok").await;

    ws.send(Message::text("ping")).await.unwrap();
    assert_eq!(read_text(&mut ws).await, "pong");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_other_frames_ignored() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = connect(addr, "tok").await;

    ws.send(Message::text("hello")).await.unwrap();
    ws.send(Message::text("PING")).await.unwrap();
    ws.send(Message::binary(b"ping".to_vec())).await.unwrap();
    ws.send(Message::text("ping")).await.unwrap();

    // Only the exact text "ping" is answered.
    assert_eq!(read_text(&mut ws).await, "pong");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_two_connections_same_key_ping_independently() {
    let (addr, server) = boot_server(test_config()).await;
    let mut a = connect(addr, "shared").await;
    let mut b = connect(addr, "shared").await;
    wait_registered(&server, "shared", 2).await;

    a.send(Message::text("ping")).await.unwrap();
    assert_eq!(read_text(&mut a).await, "pong");
    b.send(Message::text("ping")).await.unwrap();
    assert_eq!(read_text(&mut b).await, "pong");

    // Nothing extra leaked to `a` from `b`'s exchange.
    let extra = timeout(Duration::from_millis(200), a.next()).await;
    assert!(extra.is_err());

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_webhook_delivered_to_subscribers() {
    let (addr, server) = boot_server(test_config()).await;
    let mut a = connect(addr, "t1").await;
    let mut b = connect(addr, "t1").await;
    wait_registered(&server, "t1", 2).await;

    let data = json!({
        "verification_token": "t1",
        "type": "Donation",
        "amount": "3.00",
        "from_name": "Jo Example",
    })
    .to_string();
    let (status, body) = post_webhook(addr, &data).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success"}));

    for ws in [&mut a, &mut b] {
        let delivered: Value = serde_json::from_str(&read_text(ws).await).unwrap();
        assert_eq!(delivered["amount"], "3.00");
        assert_eq!(delivered["from_name"], "Jo Example");
        assert_eq!(delivered["verification_token"], "t1");
    }

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_key_isolation() {
    let (addr, server) = boot_server(test_config()).await;
    let mut target = connect(addr, "alpha").await;
    let mut bystander = connect(addr, "beta").await;
    wait_registered(&server, "alpha", 1).await;
    wait_registered(&server, "beta", 1).await;

    let (status, _) = post_webhook(addr, r#"{"verification_token":"alpha","n":1}"#).await;
    assert_eq!(status, 200);

    let delivered: Value = serde_json::from_str(&read_text(&mut target).await).unwrap();
    assert_eq!(delivered["n"], 1);
    let leaked = timeout(Duration::from_millis(200), bystander.next()).await;
    assert!(leaked.is_err(), "beta subscriber received alpha's payload");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_missing_token_is_400() {
    let (addr, server) = boot_server(test_config()).await;

    let (status, body) = post_webhook(addr, r#"{"amount":"3.00"}"#).await;
    assert_eq!(status, 400);
    assert_eq!(body, json!({"detail": "Missing verification_token"}));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_invalid_json_is_400() {
    let (addr, server) = boot_server(test_config()).await;

    let (status, body) = post_webhook(addr, "{not json").await;
    assert_eq!(status, 400);
    assert!(body["detail"].is_string());

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_webhook_without_subscribers_succeeds() {
    let (addr, server) = boot_server(test_config()).await;

    let (status, body) = post_webhook(addr, r#"{"verification_token":"nobody"}"#).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"status": "success"}));
    assert_eq!(server.registry().key_count(), 0);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_version() {
    let (addr, server) = boot_server(test_config()).await;

    let body: Value = reqwest::get(format!("http://{addr}/version"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"version": "1.2.0"}));

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_health_counts_subscribers() {
    let (addr, server) = boot_server(test_config()).await;
    let _a = connect(addr, "h1").await;
    let _b = connect(addr, "h2").await;
    wait_registered(&server, "h1", 1).await;
    wait_registered(&server, "h2", 1).await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 2);
    assert_eq!(body["routing_keys"], 2);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_disconnect_deregisters() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = connect(addr, "leaving").await;
    wait_registered(&server, "leaving", 1).await;

    ws.close(None).await.unwrap();

    let key = RoutingKey::new("leaving").unwrap();
    let registry = server.registry().clone();
    wait_until(move || !registry.contains_key(&key)).await;
    assert_eq!(server.registry().connection_count(), 0);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_dropped_client_is_pruned_on_delivery() {
    let (addr, server) = boot_server(test_config()).await;
    let ws = connect(addr, "gone").await;
    let mut alive = connect(addr, "gone").await;
    wait_registered(&server, "gone", 2).await;

    drop(ws);
    let key = RoutingKey::new("gone").unwrap();
    let registry = server.registry().clone();
    wait_until(move || registry.connections(&key).len() == 1).await;

    let (status, _) = post_webhook(addr, r#"{"verification_token":"gone","n":2}"#).await;
    assert_eq!(status, 200);
    let delivered: Value = serde_json::from_str(&read_text(&mut alive).await).unwrap();
    assert_eq!(delivered["n"], 2);

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_connection_limit() {
    let (addr, server) = boot_server(ServerConfig {
        max_connections: 1,
        ..test_config()
    })
    .await;
    let _first = connect(addr, "cap").await;
    wait_registered(&server, "cap", 1).await;

    let second = connect_async(format!("ws://{addr}/ws/cap")).await;
    assert!(second.is_err(), "second connection should be refused");

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_shutdown_closes_sessions() {
    let (addr, server) = boot_server(test_config()).await;
    let mut ws = connect(addr, "bye").await;
    wait_registered(&server, "bye", 1).await;

    server
        .shutdown()
        .graceful_shutdown(None, Some(TIMEOUT))
        .await;

    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => {}
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(closed);
    assert_eq!(server.registry().connection_count(), 0);
}

#[tokio::test]
async fn e2e_heartbeat_pings_client() {
    let (addr, server) = boot_server(ServerConfig {
        heartbeat_interval_secs: 1,
        heartbeat_timeout_secs: 3,
        ..test_config()
    })
    .await;
    let mut ws = connect(addr, "hb").await;

    let got_ping = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_))) => return true,
                Some(Ok(_)) => {}
                None | Some(Err(_)) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);
    assert!(got_ping);

    server.shutdown().shutdown();
}
