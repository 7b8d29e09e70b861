//! End-to-end tests for the session controller.
//!
//! These tests start a real Axum stub of the matching/chat service on a
//! random port and drive the controller through the HTTP client, verifying:
//! - join adopts server status/partner and fires the match notification
//! - polling replaces the message list and fires arrival cues
//! - idle polling never touches the messages endpoint
//! - stop resets locally and the poll driver winds down

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Json;
use axum::routing::{get, post};
use serde_json::{Value, json};

use clawmegle::api::HttpApi;
use clawmegle::config::Config;
use clawmegle::credentials::CredentialStore;
use clawmegle::effects::{Effect, RecordingEffects};
use clawmegle::session::{SessionController, SessionStatus};

const API_KEY: &str = "clawmegle_inttest";

#[derive(Default)]
struct ChatServer {
    status: String,
    partner: Option<Value>,
    messages: Vec<Value>,
    hits: HashMap<&'static str, usize>,
}

impl ChatServer {
    fn new() -> Self {
        Self {
            status: "idle".into(),
            ..Self::default()
        }
    }

    fn hit(&mut self, endpoint: &'static str) {
        *self.hits.entry(endpoint).or_default() += 1;
    }
}

type ServerState = Arc<Mutex<ChatServer>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {API_KEY}"))
}

async fn get_status(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    let mut server = state.lock().unwrap();
    server.hit("status");
    if !authorized(&headers) {
        return Json(json!({"success": false}));
    }
    Json(json!({
        "success": true,
        "status": server.status,
        "partner": server.partner,
        "self": {"twitter": "@me"}
    }))
}

async fn get_messages(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    let mut server = state.lock().unwrap();
    server.hit("messages");
    if !authorized(&headers) {
        return Json(json!({"success": false}));
    }
    Json(json!({"success": true, "messages": server.messages}))
}

async fn post_join(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    let mut server = state.lock().unwrap();
    server.hit("join");
    if !authorized(&headers) {
        return Json(json!({"success": false, "error": "unauthorized"}));
    }
    server.status = "active".into();
    server.partner = Some(json!({"name": "agent42", "twitter": "@agent42"}));
    Json(json!({
        "success": true,
        "status": "active",
        "partner": server.partner
    }))
}

async fn post_disconnect(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    let mut server = state.lock().unwrap();
    server.hit("disconnect");
    if !authorized(&headers) {
        return Json(json!({"success": false}));
    }
    server.status = "idle".into();
    server.partner = None;
    server.messages.clear();
    Json(json!({"success": true}))
}

async fn post_message(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut server = state.lock().unwrap();
    server.hit("message");
    if !authorized(&headers) {
        return Json(json!({"success": false, "error": "unauthorized"}));
    }
    let content = body
        .get("content")
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string();
    server.messages.push(json!({"content": content, "is_you": true}));
    Json(json!({"success": true}))
}

fn is_bind_permission_error<E: std::fmt::Display>(err: &E) -> bool {
    err.to_string().contains("Operation not permitted")
        || err.to_string().contains("failed to bind")
}

async fn start_stub_server() -> Option<(SocketAddr, ServerState)> {
    let state: ServerState = Arc::new(Mutex::new(ChatServer::new()));
    let app = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/messages", get(get_messages))
        .route("/api/join", post(post_join))
        .route("/api/disconnect", post(post_disconnect))
        .route("/api/message", post(post_message))
        .with_state(state.clone());

    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(e) if is_bind_permission_error(&e) => return None,
        Err(e) => panic!("failed to bind stub server: {e:?}"),
    };
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Some((addr, state))
}

struct Fixture {
    server: ServerState,
    controller: Arc<SessionController>,
    effects: Arc<RecordingEffects>,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Option<Fixture> {
    let (addr, server) = start_stub_server().await?;

    let mut config = Config::default();
    config.api_base_url = format!("http://{addr}");
    config.poll_interval = Duration::from_millis(25);

    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(CredentialStore::open_at(dir.path().join("creds.json")));
    store.save(API_KEY).expect("save key");

    let api = Arc::new(HttpApi::new(&config).expect("http api"));
    let effects = Arc::new(RecordingEffects::new());
    let controller = Arc::new(SessionController::new(
        api,
        store,
        effects.clone(),
        config.poll_interval,
    ));

    Some(Fixture {
        server,
        controller,
        effects,
        _dir: dir,
    })
}

fn hits(server: &ServerState, endpoint: &'static str) -> usize {
    server
        .lock()
        .unwrap()
        .hits
        .get(endpoint)
        .copied()
        .unwrap_or(0)
}

fn push_stranger_message(server: &ServerState, content: &str) {
    server
        .lock()
        .unwrap()
        .messages
        .push(json!({"content": content, "is_you": false}));
}

#[tokio::test]
async fn start_adopts_match_and_poll_picks_up_messages() {
    let Some(fx) = fixture().await else {
        return;
    };

    fx.controller.start().await.expect("start");
    let snapshot = fx.controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Active);
    assert_eq!(
        snapshot.partner.as_ref().map(|p| p.name.as_str()),
        Some("agent42")
    );
    assert!(
        snapshot
            .stranger_seed
            .as_deref()
            .is_some_and(|seed| seed.starts_with("agent42_"))
    );

    push_stranger_message(&fx.server, "hey there");
    fx.controller.poll().await;

    let snapshot = fx.controller.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].content, "hey there");
    assert_eq!(snapshot.my_twitter.as_deref(), Some("@me"));

    let effects = fx.effects.drain();
    assert_eq!(
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Matched { .. }))
            .count(),
        1
    );
    assert_eq!(
        effects.iter().filter(|e| **e == Effect::ReceiveCue).count(),
        1
    );
    assert_eq!(effects.iter().filter(|e| **e == Effect::SendCue).count(), 0);
}

#[tokio::test]
async fn own_message_round_trip_fires_send_cue() {
    let Some(fx) = fixture().await else {
        return;
    };

    fx.controller.start().await.expect("start");
    fx.controller.poll().await; // records the empty list

    fx.controller.send_message("hello!").await.expect("send");
    fx.controller.poll().await;

    let effects = fx.effects.drain();
    assert_eq!(effects.iter().filter(|e| **e == Effect::SendCue).count(), 1);
    assert_eq!(
        effects.iter().filter(|e| **e == Effect::ReceiveCue).count(),
        0
    );
    assert_eq!(hits(&fx.server, "message"), 1);
}

#[tokio::test]
async fn idle_poll_never_requests_messages() {
    let Some(fx) = fixture().await else {
        return;
    };

    fx.controller.poll().await;
    assert_eq!(fx.controller.snapshot().status, SessionStatus::Idle);
    assert_eq!(hits(&fx.server, "status"), 1);
    assert_eq!(hits(&fx.server, "messages"), 0);
}

#[tokio::test]
async fn stop_disconnects_and_resets_locally() {
    let Some(fx) = fixture().await else {
        return;
    };

    fx.controller.start().await.expect("start");
    push_stranger_message(&fx.server, "hi");
    fx.controller.poll().await;

    fx.controller.stop().await;
    let snapshot = fx.controller.snapshot();
    assert_eq!(snapshot.status, SessionStatus::Idle);
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.partner.is_none());
    assert_eq!(hits(&fx.server, "disconnect"), 1);

    // Stopping again is a no-op on local state.
    fx.controller.stop().await;
    assert_eq!(fx.controller.snapshot().status, SessionStatus::Idle);
}

#[tokio::test]
async fn poll_loop_drives_updates_until_idle() {
    let Some(fx) = fixture().await else {
        return;
    };

    fx.controller.start().await.expect("start");
    fx.controller.clone().spawn_poll_loop();

    push_stranger_message(&fx.server, "automatic");
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(fx.controller.snapshot().messages.len(), 1);

    fx.controller.stop().await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    let polls_after_stop = hits(&fx.server, "status");
    tokio::time::sleep(Duration::from_millis(80)).await;
    // The driver saw idle and exited; no further status requests.
    assert_eq!(hits(&fx.server, "status"), polls_after_stop);
}
