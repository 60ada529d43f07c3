//! Shared test utilities for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde_json::{json, Value};
use wipi_client::client::{ChunkStream, RawResponse, Request, Transport};
use wipi_client::error::{WipiError, WipiResult};

pub const BASE: &str = "http://10.20.30.40/wipi/api";

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// How a scripted streaming exchange behaves.
pub enum StreamScript {
    /// Yield these chunks, then end the body.
    Chunks(Vec<WipiResult<Bytes>>),
    /// Fail to open the exchange.
    FailOpen(WipiError),
    /// Yield these chunks, then never end.
    Hang(Vec<Bytes>),
}

impl StreamScript {
    /// A clean body split into the given text chunks.
    pub fn text(chunks: &[&str]) -> Self {
        StreamScript::Chunks(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from(c.to_string())))
                .collect(),
        )
    }
}

/// Transport that records every request and answers from a script.
///
/// One-shot exchanges without a scripted response answer `200 {"ok": true}`.
/// Streaming exchanges without a script yield an empty array.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<Request>>,
    responses: Mutex<VecDeque<WipiResult<RawResponse>>>,
    streams: Mutex<VecDeque<StreamScript>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, outcome: WipiResult<RawResponse>) {
        self.responses.lock().unwrap().push_back(outcome);
    }

    pub fn respond_json(&self, status: u16, body: &str) {
        self.respond(Ok(RawResponse::json(status, body.to_string())));
    }

    pub fn stream(&self, script: StreamScript) {
        self.streams.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Request {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request recorded")
    }

    fn record(&self, request: &Request) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn exchange(&self, request: &Request) -> WipiResult<RawResponse> {
        self.record(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::json(200, r#"{"ok":true}"#)))
    }

    async fn stream_exchange(&self, request: &Request) -> WipiResult<ChunkStream> {
        self.record(request);
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StreamScript::text(&["[]"]));

        match script {
            StreamScript::Chunks(chunks) => Ok(Box::pin(stream::iter(chunks))),
            StreamScript::FailOpen(err) => Err(err),
            StreamScript::Hang(chunks) => {
                let head = stream::iter(chunks.into_iter().map(Ok));
                Ok(Box::pin(futures::StreamExt::chain(head, stream::pending())))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mock controller service
// ---------------------------------------------------------------------------

/// In-memory state of the mock service.
#[derive(Debug, Default)]
pub struct ServiceState {
    pub states: BTreeMap<String, Value>,
    pub deferred: Vec<Value>,
    pub cancel_calls: usize,
}

pub type SharedState = Arc<Mutex<ServiceState>>;

fn initial_state() -> ServiceState {
    let mut states = BTreeMap::new();
    states.insert("system".to_string(), json!({"power": "on", "uptime": 1200}));
    states.insert(
        "relays".to_string(),
        json!({"relay1": "open", "relay2": "open"}),
    );
    states.insert("imu".to_string(), json!({"gyro": [0.0, 0.0, 0.0]}));
    ServiceState {
        states,
        ..ServiceState::default()
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "No such controller or not enabled"})),
    )
        .into_response()
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (&mut *target, patch) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
        return;
    }
    *target = patch.clone();
}

async fn contract() -> Json<Value> {
    Json(json!({
        "/": "this contract",
        "/controllers": "list of controllers",
        "/get_state/<name>": "state of a controller",
        "/set_state/<name>": "set state of a controller",
        "/downstream/<name>": "stream controller results",
    }))
}

async fn controllers() -> Json<Value> {
    Json(json!({"system": "system", "relays": "relay_board", "imu": "mpu6050"}))
}

async fn get_states(State(state): State<SharedState>) -> Json<Value> {
    let state = state.lock().unwrap();
    Json(json!(state.states))
}

async fn get_state(State(state): State<SharedState>, Path(name): Path<String>) -> Response {
    if name == "broken" {
        return (StatusCode::OK, "<html>controller crashed</html>").into_response();
    }
    let state = state.lock().unwrap();
    match state.states.get(&name) {
        Some(value) => Json(value.clone()).into_response(),
        None => not_found(),
    }
}

async fn set_states(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let Some(patch) = body.as_object() else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "expected object"}))).into_response();
    };
    let mut state = state.lock().unwrap();
    if patch.keys().any(|name| !state.states.contains_key(name)) {
        return not_found();
    }
    let mut result = serde_json::Map::new();
    for (name, value) in patch {
        if let Some(current) = state.states.get_mut(name) {
            merge(current, value);
            result.insert(name.clone(), current.clone());
        }
    }
    Json(Value::Object(result)).into_response()
}

async fn set_state(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    match state.states.get_mut(&name) {
        Some(current) => {
            merge(current, &body);
            Json(current.clone()).into_response()
        }
        None => not_found(),
    }
}

async fn schedule_states(State(state): State<SharedState>, Json(body): Json<Value>) -> Response {
    let mut state = state.lock().unwrap();
    state.deferred.push(json!({"name": null, "schedule": body}));
    Json(json!({"scheduled": true})).into_response()
}

async fn schedule_state(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    if !state.states.contains_key(&name) {
        return not_found();
    }
    state.deferred.push(json!({"name": name, "schedule": body}));
    Json(json!({"scheduled": true})).into_response()
}

async fn list_deferred(State(state): State<SharedState>) -> Json<Value> {
    let state = state.lock().unwrap();
    Json(json!(state.deferred))
}

async fn list_deferred_for(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Response {
    let state = state.lock().unwrap();
    if !state.states.contains_key(&name) {
        return not_found();
    }
    let entries: Vec<Value> = state
        .deferred
        .iter()
        .filter(|entry| entry["name"] == name.as_str())
        .cloned()
        .collect();
    Json(json!(entries)).into_response()
}

async fn cancel_deferred(State(state): State<SharedState>) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.deferred.clear();
    state.cancel_calls += 1;
    StatusCode::OK
}

/// Stream `body` as JSON array elements, one chunk per token.
///
/// Query fields: `count` (default 3), `interval_ms` (default 10), and
/// `fail_after`, which aborts the body after that many elements.
fn array_body(name: String, query: Value) -> Body {
    let count = query["count"].as_u64().unwrap_or(3);
    let interval = Duration::from_millis(query["interval_ms"].as_u64().unwrap_or(10));
    let fail_after = query["fail_after"].as_u64();

    Body::from_stream(async_stream::stream! {
        yield Ok::<_, std::io::Error>(Bytes::from_static(b"["));
        for seq in 0..count {
            if fail_after == Some(seq) {
                yield Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "controller went away"));
                return;
            }
            if seq > 0 {
                yield Ok(Bytes::from_static(b","));
            }
            tokio::time::sleep(interval).await;
            let node = json!({"name": name, "seq": seq});
            yield Ok(Bytes::from(node.to_string()));
        }
        yield Ok(Bytes::from_static(b"]"));
    })
}

async fn downstreams(Json(query): Json<Value>) -> Response {
    array_body("all".to_string(), query).into_response()
}

async fn downstream(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(query): Json<Value>,
) -> Response {
    if !state.lock().unwrap().states.contains_key(&name) {
        return not_found();
    }
    array_body(name, query).into_response()
}

/// Router for the mock controller service.
pub fn service_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(contract))
        .route("/controllers", get(controllers))
        .route("/get_state", get(get_states))
        .route("/get_state/{name}", get(get_state))
        .route("/set_state", post(set_states))
        .route("/set_state/{name}", post(set_state))
        .route("/set_state_deferred", post(schedule_states))
        .route("/set_state_deferred/{name}", post(schedule_state))
        .route("/list_deferred", get(list_deferred))
        .route("/list_deferred/{name}", get(list_deferred_for))
        .route("/cancel_deferred", get(cancel_deferred))
        .route("/downstream", post(downstreams))
        .route("/downstream/{name}", post(downstream))
        .with_state(state)
}

/// Route client logs to the test harness output. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Start the mock service on a random port.
///
/// Returns the base URL, the shared service state, and the server task.
pub async fn start_test_server() -> (String, SharedState, tokio::task::JoinHandle<()>) {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{}", addr);

    let state = Arc::new(Mutex::new(initial_state()));
    let app = service_router(Arc::clone(&state));

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Brief wait for the server to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (base_url, state, handle)
}
