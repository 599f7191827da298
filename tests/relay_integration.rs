//! End-to-end tests over real sockets.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use mmo_relay::{RelayServer, ServerConfig, ShutdownHandle};

struct TestServer {
    ws_addr: SocketAddr,
    health_addr: SocketAddr,
    shutdown: ShutdownHandle,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

async fn start_server() -> TestServer {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        health_addr: Some("127.0.0.1:0".parse().unwrap()),
        ..Default::default()
    };
    let server = RelayServer::bind(config).await.unwrap();
    let ws_addr = server.local_addr().unwrap();
    let health_addr = server.health_addr().unwrap();
    let shutdown = server.shutdown_handle();
    tokio::spawn(server.run());

    TestServer {
        ws_addr,
        health_addr,
        shutdown,
    }
}

struct Client {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Client {
    async fn connect(server: &TestServer) -> Self {
        let (ws, _) = connect_async(format!("ws://{}", server.ws_addr)).await.unwrap();
        Self { ws }
    }

    async fn send(&mut self, value: Value) {
        self.ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    async fn send_raw(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// Next JSON message.
    async fn recv(&mut self) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), self.ws.next())
                .await
                .expect("timed out waiting for message")
                .expect("connection ended")
                .expect("read failed");
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Next message of type `kind`, skipping any others.
    async fn recv_type(&mut self, kind: &str) -> Value {
        loop {
            let msg = self.recv().await;
            if msg["type"] == kind {
                return msg;
            }
        }
    }

    /// Next message that is not part of the join handshake.
    async fn recv_type_excluding_joins(&mut self) -> Value {
        loop {
            let msg = self.recv().await;
            match msg["type"].as_str() {
                Some("playerJoined") | Some("sessionJoined") | Some("updateSessionList") => continue,
                _ => return msg,
            }
        }
    }

    /// Read and discard whatever is already queued.
    async fn drain(&mut self) {
        while let Ok(Some(_)) = tokio::time::timeout(Duration::from_millis(100), self.ws.next()).await {}
    }

    async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

async fn health(server: &TestServer) -> Value {
    let mut stream = TcpStream::connect(server.health_addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let body = response.split("\r\n\r\n").nth(1).unwrap();
    serde_json::from_str(body).unwrap()
}

/// Poll `/health` until it reports the expected counts.
async fn wait_for_counts(server: &TestServer, players: u64, sessions: u64) {
    for _ in 0..50 {
        let report = health(server).await;
        if report["players"] == players && report["sessions"] == sessions {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {} players / {} sessions, got {}",
        players,
        sessions,
        health(server).await
    );
}

#[tokio::test]
async fn test_alpha_session_lifecycle() {
    let server = start_server().await;
    let mut alice = Client::connect(&server).await;
    let mut bob = Client::connect(&server).await;
    wait_for_counts(&server, 2, 0).await;

    // Alice creates "Alpha".
    alice
        .send(json!({"type": "createSession", "sessionName": "Alpha", "username": "Alice"}))
        .await;
    let created = alice.recv().await;
    assert_eq!(created["type"], "sessionCreated");
    assert_eq!(created["sessionName"], "Alpha");
    let code = created["sessionId"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);

    let joined = alice.recv().await;
    assert_eq!(joined["type"], "sessionJoined");
    assert_eq!(joined["sessionId"], code.as_str());
    assert_eq!(joined["players"], json!([]));
    assert_eq!(joined["started"], false);
    let alice_id = joined["playerId"].as_str().unwrap().to_string();
    assert_eq!(alice_id.len(), 9);
    let own = alice.recv().await;
    assert_eq!(own["type"], "playerJoined");
    assert_eq!(own["player"]["id"], alice_id.as_str());

    // Bob, still in the lobby, sees the new session.
    let list = bob.recv_type("updateSessionList").await;
    assert_eq!(list["sessions"][0]["id"], code.as_str());
    assert_eq!(list["sessions"][0]["name"], "Alpha");
    assert_eq!(list["sessions"][0]["creatorId"], alice_id.as_str());
    assert_eq!(list["sessions"][0]["playerCount"], 1);
    assert_eq!(list["sessions"][0]["started"], false);

    // Bob joins with the code.
    bob.send(json!({"type": "joinSession", "sessionId": code, "username": "Bob"}))
        .await;
    let joined = bob.recv().await;
    assert_eq!(joined["type"], "sessionJoined");
    assert_eq!(joined["players"][0]["id"], alice_id.as_str());
    assert_eq!(joined["players"][0]["username"], "Alice");
    let bob_id = joined["playerId"].as_str().unwrap().to_string();

    let announced = alice.recv().await;
    assert_eq!(announced["type"], "playerJoined");
    assert_eq!(announced["player"]["id"], bob_id.as_str());
    assert_eq!(announced["player"]["username"], "Bob");
    bob.drain().await;
    wait_for_counts(&server, 2, 1).await;

    // Only Alice may start.
    bob.send(json!({"type": "startSession", "sessionId": code})).await;
    let error = bob.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Only the session creator can start the game");

    alice.send(json!({"type": "startSession", "sessionId": code})).await;
    assert_eq!(alice.recv().await["type"], "sessionStarted");
    let started = bob.recv().await;
    assert_eq!(started["type"], "sessionStarted");
    assert_eq!(started["sessionId"], code.as_str());

    // Presence: Bob stands at the origin, Alice moves next to him.
    bob.send(json!({
        "type": "update",
        "position": {"x": 0, "y": 0, "z": 0},
        "rotation": {"y": 0},
        "modelRotation": {"y": 0},
        "animation": "idle"
    }))
    .await;
    // Frames on one connection are handled in order, so this reply means
    // Bob's position is in the grid.
    bob.send(json!({"type": "listSessions"})).await;
    bob.recv_type("updateSessionList").await;
    alice
        .send(json!({
            "type": "update",
            "position": {"x": 5, "y": 0, "z": 5},
            "rotation": {"y": 1.25},
            "modelRotation": {"y": 0.5},
            "animation": "walk"
        }))
        .await;
    let update = bob.recv().await;
    assert_eq!(update["type"], "playerUpdate");
    assert_eq!(update["id"], alice_id.as_str());
    assert_eq!(update["position"], json!({"x": 5.0, "y": 0.0, "z": 5.0}));
    assert_eq!(update["rotation"], json!({"y": 1.25}));
    assert_eq!(update["animation"], "walk");

    // Alice leaves a started session: it survives with Bob.
    alice.close().await;
    let left = bob.recv_type("playerLeft").await;
    assert_eq!(left["id"], alice_id.as_str());
    wait_for_counts(&server, 1, 1).await;

    // Bob leaves: the started session goes with him.
    bob.close().await;
    wait_for_counts(&server, 0, 0).await;
}

#[tokio::test]
async fn test_idle_creator_leaving_removes_session() {
    let server = start_server().await;
    let mut alice = Client::connect(&server).await;
    let mut carol = Client::connect(&server).await;
    wait_for_counts(&server, 2, 0).await;

    alice
        .send(json!({"type": "createSession", "sessionName": "Lonely"}))
        .await;
    alice.recv_type("sessionJoined").await;
    carol.recv_type("updateSessionList").await;

    alice.close().await;

    // The roster is rebroadcast without the session.
    let list = carol.recv_type("updateSessionList").await;
    assert_eq!(list["sessions"], json!([]));

    carol.send(json!({"type": "listSessions"})).await;
    let list = carol.recv_type("updateSessionList").await;
    assert_eq!(list["sessions"], json!([]));
    wait_for_counts(&server, 1, 0).await;
}

#[tokio::test]
async fn test_join_unknown_session_gets_error() {
    let server = start_server().await;
    let mut bob = Client::connect(&server).await;

    bob.send(json!({"type": "joinSession", "sessionId": "ZZZZZZ", "username": "Bob"}))
        .await;
    let error = bob.recv().await;
    assert_eq!(error["type"], "error");
    assert_eq!(
        error["message"],
        "Session not found. Please check the ID and try again."
    );
}

#[tokio::test]
async fn test_bad_frames_keep_connection_open() {
    let server = start_server().await;
    let mut bob = Client::connect(&server).await;

    bob.send_raw("this is not json").await;
    bob.send_raw(r#"{"type":"fly","speed":9000}"#).await;
    bob.send(json!({"type": "update", "position": {"x": 1, "y": 2, "z": 3}}))
        .await;
    bob.send(json!({"type": "listSessions"})).await;

    let list = bob.recv().await;
    assert_eq!(list["type"], "updateSessionList");
    assert_eq!(list["sessions"], json!([]));
}

#[tokio::test]
async fn test_distant_players_do_not_hear_updates() {
    let server = start_server().await;
    let mut alice = Client::connect(&server).await;
    let mut bob = Client::connect(&server).await;

    alice
        .send(json!({"type": "createSession", "sessionName": "Wide"}))
        .await;
    let code = alice.recv_type("sessionCreated").await["sessionId"]
        .as_str()
        .unwrap()
        .to_string();
    bob.send(json!({"type": "joinSession", "sessionId": code})).await;
    bob.recv_type("sessionJoined").await;

    bob.send(json!({"type": "update", "position": {"x": 500, "y": 0, "z": 500}}))
        .await;
    alice
        .send(json!({"type": "update", "position": {"x": 0, "y": 0, "z": 0}}))
        .await;
    // Sounds still reach the whole session.
    alice
        .send(json!({"type": "sound", "soundType": "bell", "position": {"x": 0, "y": 0, "z": 0}}))
        .await;

    let next = bob.recv_type_excluding_joins().await;
    assert_eq!(next["type"], "playSound");
    assert_eq!(next["soundType"], "bell");
}

#[tokio::test]
async fn test_metrics_endpoint_counts_messages() {
    let server = start_server().await;
    let mut bob = Client::connect(&server).await;
    bob.send(json!({"type": "listSessions"})).await;
    bob.recv().await;

    let mut stream = TcpStream::connect(server.health_addr).await.unwrap();
    stream
        .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.contains("relay_messages_received_total{type=\"listSessions\"} 1"));
    assert!(response.contains("relay_messages_sent_total{type=\"updateSessionList\"}"));
    assert!(response.contains("relay_active_connections 1"));
}
