//! Tests of the HTTP and WebSocket host over a real socket.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{sample_catalog, test_engine, ScriptedModel};
use futures::{SinkExt, StreamExt};
use lessonloop_engine::{
    create_router, AppState, CompletionStatus, InMemoryProgressStore, SessionEvent, TutorPhase,
};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serves the sample lessons on an ephemeral port.
async fn spawn_server(model: ScriptedModel) -> SocketAddr {
    let engine = test_engine(Arc::new(model), Arc::new(InMemoryProgressStore::new()));
    let router = create_router(AppState::new(engine, sample_catalog()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    addr
}

async fn create_session(client: &reqwest::Client, addr: SocketAddr, lesson_id: &str) -> String {
    let response = client
        .post(format!("http://{addr}/api/sessions"))
        .json(&json!({ "userId": "ada", "lessonId": lesson_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let body: Value = response.json().await.unwrap();
    body["sessionId"].as_str().unwrap().to_string()
}

async fn connect_events(addr: SocketAddr, session_id: &str) -> WsClient {
    let url = format!("ws://{addr}/api/sessions/{session_id}/events");
    let (stream, _) = connect_async(url.as_str())
        .await
        .expect("Failed to connect to WebSocket");
    stream
}

/// Receives the next session event, answering pings along the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

// ============================================================================
// HTTP
// ============================================================================

#[tokio::test]
async fn test_lessons_are_listed() {
    let addr = spawn_server(ScriptedModel::default()).await;

    let lessons: Value = reqwest::get(format!("http://{addr}/api/lessons"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let ids: Vec<&str> = lessons
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["loops", "python-greeting", "variables"]);
}

#[tokio::test]
async fn test_session_flow_over_http() {
    let addr = spawn_server(ScriptedModel::default()).await;
    let client = reqwest::Client::new();
    let id = create_session(&client, addr, "variables").await;

    let reply: Value = client
        .post(format!("http://{addr}/api/sessions/{id}/messages"))
        .json(&json!({ "text": "ready" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["phase"], "problem");

    let report: Value = client
        .post(format!("http://{addr}/api/sessions/{id}/run"))
        .json(&json!({ "code": "let x = 5;\nconsole.log(x);" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["completion"], "completed");
    assert_eq!(report["result"]["origin"], "native");

    let missing = client
        .get(format!("http://{addr}/api/sessions/nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

// ============================================================================
// WebSocket
// ============================================================================

#[tokio::test]
async fn test_events_stream_over_websocket() {
    let addr = spawn_server(ScriptedModel::default()).await;
    let client = reqwest::Client::new();
    let id = create_session(&client, addr, "variables").await;

    let mut ws = connect_events(addr, &id).await;
    match receive_event(&mut ws).await {
        SessionEvent::Connected(payload) => {
            assert_eq!(payload.snapshot.session_id, id);
            assert_eq!(payload.snapshot.phase, TutorPhase::Intro);
            assert_eq!(payload.snapshot.turns.len(), 1);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }

    client
        .post(format!("http://{addr}/api/sessions/{id}/run"))
        .json(&json!({ "code": "let x = 5;\nconsole.log(x);" }))
        .send()
        .await
        .unwrap();

    let started = receive_event(&mut ws).await;
    assert_eq!(started.event_name(), "run_started");

    match receive_event(&mut ws).await {
        SessionEvent::RunFinished(payload) => {
            assert!(payload.result.success);
            assert_eq!(payload.result.output[0].content, "5");
        }
        other => panic!("Expected RunFinished event, got: {other:?}"),
    }

    assert_eq!(receive_event(&mut ws).await.event_name(), "graded");

    match receive_event(&mut ws).await {
        SessionEvent::CompletionChanged(payload) => {
            assert_eq!(payload.to, CompletionStatus::Completed);
        }
        other => panic!("Expected CompletionChanged event, got: {other:?}"),
    }

    match receive_event(&mut ws).await {
        SessionEvent::TutorTurn(payload) => assert_eq!(payload.phase, TutorPhase::Success),
        other => panic!("Expected TutorTurn event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_sessions_do_not_share_events() {
    let addr = spawn_server(ScriptedModel::default()).await;
    let client = reqwest::Client::new();
    let first = create_session(&client, addr, "variables").await;
    let second = create_session(&client, addr, "loops").await;

    let mut ws = connect_events(addr, &second).await;
    assert_eq!(receive_event(&mut ws).await.event_name(), "connected");

    client
        .post(format!("http://{addr}/api/sessions/{first}/run"))
        .json(&json!({ "code": "let x = 5;" }))
        .send()
        .await
        .unwrap();

    let quiet = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(quiet.is_err(), "second session received another session's event");
}

#[tokio::test]
async fn test_deleting_session_closes_event_stream() {
    let addr = spawn_server(ScriptedModel::default()).await;
    let client = reqwest::Client::new();
    let id = create_session(&client, addr, "variables").await;

    let mut ws = connect_events(addr, &id).await;
    assert_eq!(receive_event(&mut ws).await.event_name(), "connected");

    let deleted = client
        .delete(format!("http://{addr}/api/sessions/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    // The server ends the stream once the session is gone.
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "event stream stayed open after delete");

    let missing = client
        .post(format!("http://{addr}/api/sessions/{id}/run"))
        .json(&json!({ "code": "let x = 1;" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_unknown_session_rejects_websocket() {
    let addr = spawn_server(ScriptedModel::default()).await;
    let url = format!("ws://{addr}/api/sessions/missing/events");

    assert!(connect_async(url.as_str()).await.is_err());
}
