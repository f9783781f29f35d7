//! GigaChat API client.
//!
//! Two calls make up one analysis: an OAuth exchange of the pre-shared key
//! for a short-lived bearer token, then a chat completion carrying that
//! token. Each call is a single POST with no retry and no timeout beyond the
//! client default. Every failure mode is reported as its own
//! [`GigaChatError`] variant.

use std::fmt;

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Credential, GigaChatSettings};

/// Header carrying the per-call correlation id on the OAuth request.
pub const CORRELATION_HEADER: &str = "RqUID";

#[derive(Debug, Error)]
pub enum GigaChatError {
    #[error("failed to initialise HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to build request: {0}")]
    Build(#[source] reqwest::Error),
    #[error("failed to send request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to read response: {0}")]
    Read(#[source] reqwest::Error),
    #[error("API error: {status}, response body: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Bearer token returned by the OAuth endpoint.  Absent fields decode to
/// their zero values (empty token, Unix epoch).
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    #[serde(default, rename = "access_token")]
    pub token: String,
    /// Upstream sends epoch milliseconds.
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Single-turn request with the prompt as the only user message.
    pub fn user_prompt(model: &str, prompt: &str) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ChatMessage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// HTTP client bound to one set of upstream endpoints. Cheap to share; the
/// inner `reqwest::Client` pools connections.
#[derive(Clone)]
pub struct GigaChatClient {
    http: reqwest::Client,
    oauth_url: String,
    completions_url: String,
    scope: String,
    model: String,
}

impl GigaChatClient {
    pub fn new(settings: &GigaChatSettings) -> Result<Self, GigaChatError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(GigaChatError::Client)?;
        Ok(Self {
            http,
            oauth_url: settings.oauth_url.clone(),
            completions_url: format!(
                "{}/chat/completions",
                settings.api_url.trim_end_matches('/')
            ),
            scope: settings.scope.clone(),
            model: settings.model.clone(),
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    /// Exchange the pre-shared key for a bearer token.
    pub async fn access_token(&self, credential: &Credential) -> Result<AccessToken, GigaChatError> {
        let rq_uid = uuid::Uuid::new_v4().to_string();
        let request = self
            .http
            .post(&self.oauth_url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .header(CORRELATION_HEADER, &rq_uid)
            .header(AUTHORIZATION, format!("Basic {}", credential.as_str()))
            .body(format!("scope={}", self.scope))
            .build()
            .map_err(GigaChatError::Build)?;

        tracing::debug!(rq_uid = %rq_uid, url = %self.oauth_url, "requesting access token");
        let body = self.execute(request).await?;
        serde_json::from_str::<AccessToken>(&body).map_err(GigaChatError::Decode)
    }

    /// Send the prompt as a single user message.
    pub async fn chat(&self, token: &AccessToken, prompt: &str) -> Result<ChatResponse, GigaChatError> {
        let payload = ChatRequest::user_prompt(&self.model, prompt);
        let encoded = serde_json::to_vec(&payload).map_err(GigaChatError::Encode)?;
        let request = self
            .http
            .post(&self.completions_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .bearer_auth(&token.token)
            .body(encoded)
            .build()
            .map_err(GigaChatError::Build)?;

        tracing::debug!(url = %self.completions_url, model = %self.model, "sending chat completion");
        let body = self.execute(request).await?;
        let response =
            serde_json::from_str::<ChatResponse>(&body).map_err(GigaChatError::Decode)?;
        if let Some(usage) = response.usage {
            tracing::debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "chat completion usage"
            );
        }
        Ok(response)
    }

    /// Send a built request and return the body of a 200 response.
    async fn execute(&self, request: reqwest::Request) -> Result<String, GigaChatError> {
        let resp = self
            .http
            .execute(request)
            .await
            .map_err(GigaChatError::Transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(GigaChatError::Read)?;
        if status != StatusCode::OK {
            return Err(GigaChatError::Status { status, body });
        }
        Ok(body)
    }
}
