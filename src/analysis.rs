//! Token-then-chat composition behind the analyze endpoint.

use thiserror::Error;

use crate::config::Credential;
use crate::gigachat::{AccessToken, ChatMessage, ChatResponse, GigaChatClient, GigaChatError};
use crate::prompt::build_prompt;
use crate::AnalysisRequest;

/// The two upstream calls an analysis needs.
#[async_trait::async_trait]
pub trait CompletionApi: Send + Sync {
    async fn access_token(&self, credential: &Credential) -> Result<AccessToken, GigaChatError>;
    async fn chat(&self, token: &AccessToken, prompt: &str) -> Result<ChatResponse, GigaChatError>;
}

#[async_trait::async_trait]
impl CompletionApi for GigaChatClient {
    async fn access_token(&self, credential: &Credential) -> Result<AccessToken, GigaChatError> {
        GigaChatClient::access_token(self, credential).await
    }

    async fn chat(&self, token: &AccessToken, prompt: &str) -> Result<ChatResponse, GigaChatError> {
        GigaChatClient::chat(self, token, prompt).await
    }
}

/// Failure of one analysis, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("failed to obtain access token: {0}")]
    Token(#[source] GigaChatError),
    #[error("analysis request failed: {0}")]
    Chat(#[source] GigaChatError),
    #[error("analysis request failed: response contained no choices")]
    NoChoices,
}

impl AnalysisError {
    pub fn stage(&self) -> &'static str {
        match self {
            AnalysisError::Token(_) => "token",
            AnalysisError::Chat(_) | AnalysisError::NoChoices => "chat",
        }
    }
}

/// Fetch a fresh token, send the product prompt and return the first choice.
/// A token failure returns before any chat call is made.
pub async fn analyze(
    api: &dyn CompletionApi,
    credential: &Credential,
    request: &AnalysisRequest,
) -> Result<ChatMessage, AnalysisError> {
    let token = api
        .access_token(credential)
        .await
        .map_err(AnalysisError::Token)?;
    tracing::debug!(expires_at = %token.expires_at, "access token obtained");

    let prompt = build_prompt(request);
    let response = api
        .chat(&token, &prompt)
        .await
        .map_err(AnalysisError::Chat)?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or(AnalysisError::NoChoices)
}
