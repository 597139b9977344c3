// openai.rs — Blocking client for OpenAI-compatible embedding and chat endpoints.
//
// No retries: every failure is surfaced to the caller as a ProviderError.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::completion::{ChatMessage, CompletionProvider};
use crate::config;
use crate::embeddings::EmbeddingProvider;
use crate::error::ProviderError;

#[derive(Clone)]
pub struct OpenAiClient {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config::http::REQUEST_TIMEOUT_SECS))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// API key from the environment; a missing key only fails once a call is made.
    pub fn from_env(base_url: &str) -> Self {
        let key = std::env::var(config::http::API_KEY_ENV).ok();
        if key.is_none() {
            log::warn!("{} is not set; provider calls will fail", config::http::API_KEY_ENV);
        }
        Self::new(base_url, key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingCredentials(config::http::API_KEY_ENV))?;
        let url = format!("{}{}", self.base_url, path);

        match self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {key}"))
            .send_json(body)
        {
            Ok(resp) => resp
                .into_json::<R>()
                .map_err(|e| ProviderError::Decode(e.to_string())),
            Err(ureq::Error::Status(status, resp)) => {
                let status_text = resp.status_text().to_string();
                let body = resp.into_string().unwrap_or_default();
                Err(ProviderError::Http {
                    status,
                    reason: error_reason(&body).unwrap_or(status_text),
                })
            }
            Err(ureq::Error::Transport(t)) => Err(ProviderError::Transport(t.to_string())),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for OpenAiClient {
    fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError> {
        let resp: EmbeddingResponse = self.post_json("/v1/embeddings", &EmbeddingRequest { model, input: text })?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl CompletionProvider for OpenAiClient {
    fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let resp: ChatResponse = self.post_json("/v1/chat/completions", &ChatRequest { model, messages })?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }
}

/// Pull `error.message` out of an OpenAI-style error body.
fn error_reason(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
