#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::post, Router};
use product_analyzer::{app, build_state, AppConfig, Credential};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const CREDENTIAL: &str = "dGVzdC1jbGllbnQ6dGVzdC1zZWNyZXQ=";

/// Scripted responses for the two upstream endpoints.
#[derive(Clone)]
pub struct Behavior {
    pub token_status: StatusCode,
    pub token_body: String,
    pub chat_status: StatusCode,
    pub chat_body: String,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            token_status: StatusCode::OK,
            token_body: json!({"access_token": "tok123", "expires_at": 1706026848841i64})
                .to_string(),
            chat_status: StatusCode::OK,
            chat_body: json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Analysis..."},
                    "index": 0,
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 60, "completion_tokens": 12, "total_tokens": 72},
                "model": "GigaChat",
                "object": "chat.completion"
            })
            .to_string(),
        }
    }
}

/// What the mock upstream saw.
#[derive(Default, Clone, Debug)]
pub struct Recorded {
    pub token_authorization: Vec<String>,
    pub token_rq_uids: Vec<String>,
    pub token_forms: Vec<String>,
    pub chat_authorization: Vec<String>,
    pub chat_bodies: Vec<Value>,
}

#[derive(Clone)]
struct MockState {
    behavior: Behavior,
    token_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Recorded>>,
}

pub struct MockUpstream {
    pub base: String,
    token_calls: Arc<AtomicUsize>,
    chat_calls: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Recorded>>,
    _handle: JoinHandle<()>,
}

impl MockUpstream {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().unwrap().clone()
    }

    /// Application config pointing both endpoints at this mock.
    pub fn config(&self) -> AppConfig {
        let mut cfg = AppConfig::with_credential(Credential::new(CREDENTIAL));
        cfg.gigachat.oauth_url = format!("{}/api/v2/oauth", self.base);
        cfg.gigachat.api_url = format!("{}/api/v1", self.base);
        cfg
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn oauth(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    {
        let mut rec = state.recorded.lock().unwrap();
        rec.token_authorization
            .push(header_string(&headers, "authorization"));
        rec.token_rq_uids.push(header_string(&headers, "rquid"));
        rec.token_forms.push(body);
    }
    (state.behavior.token_status, state.behavior.token_body.clone())
}

async fn completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    state.chat_calls.fetch_add(1, Ordering::SeqCst);
    {
        let mut rec = state.recorded.lock().unwrap();
        rec.chat_authorization
            .push(header_string(&headers, "authorization"));
        rec.chat_bodies
            .push(serde_json::from_str(&body).unwrap_or(Value::Null));
    }
    (state.behavior.chat_status, state.behavior.chat_body.clone())
}

pub async fn start_mock_upstream(behavior: Behavior) -> MockUpstream {
    let token_calls = Arc::new(AtomicUsize::new(0));
    let chat_calls = Arc::new(AtomicUsize::new(0));
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let state = MockState {
        behavior,
        token_calls: token_calls.clone(),
        chat_calls: chat_calls.clone(),
        recorded: recorded.clone(),
    };
    let router = Router::new()
        .route("/api/v2/oauth", post(oauth))
        .route("/api/v1/chat/completions", post(completions))
        .with_state(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    MockUpstream {
        base: format!("http://{}", addr),
        token_calls,
        chat_calls,
        recorded,
        _handle: handle,
    }
}

/// Spin up the application with the given configuration on an ephemeral port.
pub async fn spawn_app(config: &AppConfig) -> (String, JoinHandle<()>) {
    let state = build_state(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app(state);
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}

pub fn chair() -> Value {
    json!({"name": "Chair", "category": "Furniture", "keywords": "ergonomic,wood"})
}
