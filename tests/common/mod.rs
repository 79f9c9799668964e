//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;

use rpc_proxy::config::loader::parse_config;
use rpc_proxy::http::{router, RpcServer};
use rpc_proxy::Metrics;

/// How a mock node answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Answer every call with `"<node>:<method>"`, in reverse order for batches.
    Echo,
    /// Echo after a delay.
    Slow(Duration),
    /// Fail with this HTTP status.
    Status(u16),
}

/// One request as seen by a mock node.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

struct MockState {
    name: String,
    behavior: Behavior,
    requests: Mutex<Vec<Recorded>>,
}

/// A JSON-RPC node on an ephemeral port that records what it receives.
#[derive(Clone)]
pub struct MockBackend {
    pub url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start(name: &str, behavior: Behavior) -> Self {
        let state = Arc::new(MockState {
            name: name.to_string(),
            behavior,
            requests: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/", post(handle))
            .route("/{*path}", post(handle))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            state,
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }

    /// Poll until at least `n` requests have arrived.
    pub async fn wait_for_requests(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.request_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("backend never received the expected requests");
    }
}

async fn handle(State(state): State<Arc<MockState>>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    state.requests.lock().unwrap().push(Recorded {
        uri,
        headers,
        body: body.clone(),
    });

    match state.behavior {
        Behavior::Status(code) => {
            return StatusCode::from_u16(code).unwrap().into_response();
        }
        Behavior::Slow(delay) => tokio::time::sleep(delay).await,
        Behavior::Echo => {}
    }

    let request: Value = serde_json::from_slice(&body).unwrap();
    let answer = |call: &Value| {
        json!({
            "jsonrpc": "2.0",
            "id": call["id"],
            "result": format!("{}:{}", state.name, call["method"].as_str().unwrap_or_default()),
        })
    };
    let response = match &request {
        Value::Array(calls) => Value::Array(calls.iter().rev().map(answer).collect()),
        single => answer(single),
    };
    axum::Json(response).into_response()
}

/// Build a dispatcher from TOML and a fresh metrics sink.
pub fn rpc_server(toml: &str) -> (Arc<RpcServer>, Arc<Metrics>) {
    let config = parse_config(toml).unwrap();
    let metrics = Arc::new(Metrics::new());
    let server = RpcServer::from_config(&config, metrics.clone()).unwrap();
    (Arc::new(server), metrics)
}

pub fn post_request(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Drive one request through the full router.
pub async fn send(server: &Arc<RpcServer>, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = router(server.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}
