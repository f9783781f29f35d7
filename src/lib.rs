//! Core library for the product analyzer.  This module wires together the
//! request/response structures, shared state and HTTP handlers.  The
//! upstream GigaChat calls live in [`gigachat`], their composition in
//! [`analysis`].

mod config;
mod error;
pub mod analysis;
pub mod gigachat;
pub mod prompt;

pub use config::{AppConfig, Credential, GigaChatSettings};
pub use error::AppError;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use axum::body::Bytes;
use axum::extract::{rejection::BytesRejection, DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::analysis::CompletionApi;
use crate::gigachat::{ChatMessage, GigaChatClient};

/// Product description submitted by the frontend.  Absent and `null` fields
/// decode as empty strings; no further validation is applied.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub keywords: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Immutable state shared across handlers.  Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn CompletionApi>,
    pub credential: Arc<Credential>,
    pub index_html: Bytes,
    pub allowed_origins: Arc<Vec<HeaderValue>>,
    /// Maximum accepted raw request body size in bytes (None => axum default)
    pub max_request_bytes: Option<usize>,
}

/// Build state from environment variables.  See [`AppConfig::from_env`] for
/// the variables read.
pub fn build_state_from_env() -> Result<AppState> {
    let config = AppConfig::from_env()?;
    build_state(&config)
}

/// Build state backed by a real GigaChat client.
pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let client =
        GigaChatClient::new(&config.gigachat).context("Failed to initialise GigaChat client")?;
    build_state_with_api(config, Arc::new(client))
}

/// Build state around any [`CompletionApi`].  Fails if the page template is
/// unreadable or an allowed origin is not a valid header value.
pub fn build_state_with_api(config: &AppConfig, api: Arc<dyn CompletionApi>) -> Result<AppState> {
    let index_html = std::fs::read(&config.template_path).with_context(|| {
        format!(
            "Failed to read page template '{}'",
            config.template_path.display()
        )
    })?;

    let mut allowed_origins = Vec::with_capacity(config.allowed_origins.len());
    for origin in &config.allowed_origins {
        if origin == "*" {
            return Err(anyhow!("Wildcard origin is not supported in the CORS allow-list"));
        }
        let value = HeaderValue::from_str(origin)
            .with_context(|| format!("Invalid CORS origin '{}'", origin))?;
        allowed_origins.push(value);
    }

    Ok(AppState {
        api,
        credential: Arc::new(config.credential.clone()),
        index_html: Bytes::from(index_html),
        allowed_origins: Arc::new(allowed_origins),
        max_request_bytes: config.max_request_bytes,
    })
}

/// CORS policy for `/analyze`: echo only exact allow-listed origins and answer
/// preflight requests without reaching the handler.
fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.max_request_bytes;

    let analyze = post(analyze_handler)
        .fallback(method_not_allowed)
        .layer(cors_layer(&state.allowed_origins));

    let router = Router::new()
        .route("/", get(index_handler))
        .route("/analyze", analyze)
        .route("/healthz", get(healthz_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(DefaultBodyLimit::max(limit))
    } else {
        router
    };

    router.with_state(state)
}

async fn index_handler(State(state): State<AppState>) -> Html<Bytes> {
    Html(state.index_html.clone())
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

/// Handler for `POST /analyze`.  The body is decoded as JSON whatever its
/// declared content type.
async fn analyze_handler(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatMessage>, AppError> {
    let body = body?;
    // A bare `null` body leaves every field empty.
    let request = serde_json::from_slice::<Option<AnalysisRequest>>(&body)
        .map_err(|e| AppError::BadRequest(format!("failed to decode JSON: {}", e)))?
        .unwrap_or_default();

    tracing::info!(
        product = %request.name,
        category = %request.category,
        keywords = %request.keywords,
        "analysis requested"
    );
    let start = Instant::now();
    match analysis::analyze(state.api.as_ref(), &state.credential, &request).await {
        Ok(message) => {
            tracing::info!(
                latency_ms = start.elapsed().as_millis() as u64,
                chars = message.content.chars().count(),
                "analysis complete"
            );
            Ok(Json(message))
        }
        Err(err) => {
            tracing::warn!(
                stage = err.stage(),
                error = %err,
                latency_ms = start.elapsed().as_millis() as u64,
                "analysis failed"
            );
            Err(AppError::Analysis(err))
        }
    }
}

/// Simple health endpoint for container readiness / liveness checks.
async fn healthz_handler() -> axum::response::Response {
    let json = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(json)).into_response()
}
