//! In-process mock of the remote service: token/account/reward HTTP endpoints
//! and the orchestrator websocket, with knobs for injecting failures.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, serve};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use uuid::Uuid;

use worker_fleet::config::{Endpoints, Timing};
use worker_fleet::identity::Session;
use worker_fleet::store::derive_worker_id;

/// Maximum time any wait in a test may take before it counts as hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames received on one accepted websocket.
#[derive(Debug, Clone)]
pub struct Connection {
    pub token: String,
    pub frames: Vec<Value>,
}

impl Connection {
    pub fn msg_types(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|f| f["msgType"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn heartbeats(&self) -> usize {
        self.msg_types().iter().filter(|t| *t == "HEARTBEAT").count()
    }
}

#[derive(Default)]
pub struct MockState {
    calls: Mutex<HashMap<String, usize>>,
    /// Reported by claim_details.
    pub claimed: AtomicBool,
    /// claim_details answers 500 while set.
    pub claim_details_down: AtomicBool,
    /// Number of upcoming token requests that fail with 500.
    pub token_failures: AtomicUsize,
    /// Medal tiers that fail with 500.
    pub failing_tiers: Mutex<HashSet<u8>>,
    /// Per token: upgrades still to reject with 503.
    pub handshake_rejections: Mutex<HashMap<String, usize>>,
    /// Per token: close the next accepted connection after this many heartbeats.
    pub close_after: Mutex<HashMap<String, usize>>,
    connections: Mutex<Vec<Connection>>,
}

impl MockState {
    fn hit(&self, endpoint: &str) {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default() += 1;
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.lock().unwrap().clone()
    }

    pub fn connections_for(&self, token: &str) -> Vec<Connection> {
        self.connections()
            .into_iter()
            .filter(|c| c.token == token)
            .collect()
    }

    pub fn reject_handshakes(&self, token: &str, times: usize) {
        self.handshake_rejections
            .lock()
            .unwrap()
            .insert(token.to_string(), times);
    }

    pub fn close_after_heartbeats(&self, token: &str, heartbeats: usize) {
        self.close_after
            .lock()
            .unwrap()
            .insert(token.to_string(), heartbeats);
    }

    pub fn fail_tiers(&self, tiers: &[u8]) {
        self.failing_tiers.lock().unwrap().extend(tiers);
    }
}

pub struct MockServer {
    pub state: Arc<MockState>,
    pub base_url: String,
    pub ws_url: String,
}

impl MockServer {
    pub fn endpoints(&self) -> Arc<Endpoints> {
        Arc::new(Endpoints {
            api_base: self.base_url.clone(),
            rewards_base: self.base_url.clone(),
            ws_url: self.ws_url.clone(),
        })
    }
}

/// Start the mock on a random port.
pub async fn start() -> MockServer {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/api/v1/auth/generate_token", post(generate_token))
        .route("/api/v1/users/me", get(users_me))
        .route("/api/v1/reward_realtime", get(reward_realtime))
        .route("/api/v1/reward_history", get(reward_history))
        .route("/api/v1/reward", get(reward))
        .route("/api/v1/claim_details", get(claim_details))
        .route("/api/v1/claim_reward", get(claim_reward))
        .route("/api/v1/claim_tier", put(claim_tier))
        .route("/ws/v1/orch", get(orchestrator))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    MockServer {
        state,
        base_url: format!("http://127.0.0.1:{port}"),
        ws_url: format!("ws://127.0.0.1:{port}/ws/v1/orch"),
    }
}

/// Token the mock issues for `address`.
pub fn token_for(address: &str) -> String {
    format!("tok-{address}")
}

/// Account id the mock reports for `address`.
pub fn account_for(address: &str) -> String {
    format!("acct-{}", token_for(address))
}

pub fn session(address: &str) -> Session {
    Session {
        address: address.to_string(),
        worker_id: derive_worker_id(address),
        session_id: Uuid::new_v4(),
        token: SecretString::from(token_for(address)),
    }
}

/// Timing scaled down for real-clock tests.
pub fn fast_timing() -> Timing {
    Timing {
        heartbeat_interval: Duration::from_millis(100),
        reconnect_delay: Duration::from_millis(300),
        retry_delay: Duration::from_millis(50),
        retry_attempts: 3,
        claim_interval: Duration::from_secs(3600),
        medal_interval: Duration::from_secs(3600),
        details_interval: Duration::from_millis(200),
    }
}

/// Poll `check` until it returns true or the test timeout elapses.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

fn server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn generate_token(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.hit("generate_token");
    let failing = state
        .token_failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return server_error();
    }
    let address = body["address"].as_str().unwrap_or_default();
    Json(json!({ "status": "SUCCESS", "data": { "token": token_for(address) } })).into_response()
}

async fn users_me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Json<Value> {
    state.hit("users_me");
    Json(json!({ "data": { "id": format!("acct-{}", bearer(&headers)) } }))
}

async fn reward_realtime(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.hit("reward_realtime");
    Json(json!({ "data": [{ "total_heartbeats": "12" }] }))
}

async fn reward_history(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.hit("reward_history");
    Json(json!({ "data": [] }))
}

async fn reward(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.hit("reward");
    Json(json!({ "data": { "totalPoint": 3.5, "name": "Epoch 7" } }))
}

async fn claim_details(State(state): State<Arc<MockState>>) -> Response {
    state.hit("claim_details");
    if state.claim_details_down.load(Ordering::SeqCst) {
        return server_error();
    }
    let claimed = state.claimed.load(Ordering::SeqCst);
    Json(json!({ "data": { "claimed": claimed } })).into_response()
}

async fn claim_reward(State(state): State<Arc<MockState>>) -> Json<Value> {
    state.hit("claim_reward");
    state.claimed.store(true, Ordering::SeqCst);
    Json(json!({ "status": "SUCCESS", "data": null }))
}

async fn claim_tier(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.hit("claim_tier");
    let tier = body["tierId"].as_u64().unwrap_or_default() as u8;
    if state.failing_tiers.lock().unwrap().contains(&tier) {
        return server_error();
    }
    Json(json!({ "status": "SUCCESS", "data": true })).into_response()
}

async fn orchestrator(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    state.hit("ws_upgrade");
    let token = query.get("authToken").cloned().unwrap_or_default();
    {
        let mut rejections = state.handshake_rejections.lock().unwrap();
        if let Some(remaining) = rejections.get_mut(&token) {
            if *remaining > 0 {
                *remaining -= 1;
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
    }
    ws.on_upgrade(move |socket| handle_socket(state, token, socket))
}

async fn handle_socket(state: Arc<MockState>, token: String, mut socket: WebSocket) {
    let conn = {
        let mut connections = state.connections.lock().unwrap();
        connections.push(Connection {
            token: token.clone(),
            frames: Vec::new(),
        });
        connections.len() - 1
    };
    let close_after = state.close_after.lock().unwrap().remove(&token);
    let mut heartbeats = 0;

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap_or(Value::Null);
        let msg_type = frame["msgType"].as_str().unwrap_or_default().to_string();
        state.connections.lock().unwrap()[conn].frames.push(frame);

        match msg_type.as_str() {
            "REGISTER" => {
                let ack = json!({ "status": "registered" }).to_string();
                if socket.send(Message::Text(ack.into())).await.is_err() {
                    break;
                }
            }
            "HEARTBEAT" => {
                heartbeats += 1;
                if close_after == Some(heartbeats) {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
            _ => {}
        }
    }
}
