//! HTTP model backend speaking the OpenAI-compatible chat-completions protocol
//!
//! Configuration comes from `EngineConfig`:
//! - `LLM_API_URL`: chat-completions endpoint
//! - `LLM_API_KEY`: bearer token, optional for local backends

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use error_handling_rs::{Error, Result};

use crate::collaborators::{ChatMessage, ModelClient, ModelRequest};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// Backends signal overload with these
fn is_capacity_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 503 | 529)
}

#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: Client,
    api_url: String,
    api_key: Option<String>,
}

impl HttpModelClient {
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {}", e)))?;

        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("LLM_API_KEY is not set; model requests are sent unauthenticated");
        }

        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
        })
    }

    pub fn from_config(config: &config_rs::EngineConfig) -> Result<Self> {
        Self::new(
            config.llm_api_url.clone(),
            config.llm_api_key.clone(),
            config.model_timeout,
        )
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn run(&self, model_id: &str, request: &ModelRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: model_id,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(url = %self.api_url, model = %model_id, "Sending model request");

        let mut builder = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| Error::from(e).service(model_id))?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = format!("model backend returned {}: {}", status, text.trim());
            let err = if is_capacity_status(status) {
                Error::capacity_exceeded(message)
            } else if status.is_server_error() {
                Error::external(message).transient()
            } else {
                Error::external(message)
            };
            return Err(err.service(model_id).context("status", status.as_u16()));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::from(e).service(model_id))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                Error::external("model backend returned no completion").service(model_id)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_statuses() {
        assert!(is_capacity_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_capacity_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_capacity_status(StatusCode::from_u16(529).unwrap()));
        assert!(!is_capacity_status(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::user("hello")];
        let body = ChatCompletionRequest {
            model: "small",
            messages: &messages,
            max_tokens: 16,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "small");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 16);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"ROOT_CAUSE: x"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ROOT_CAUSE: x"));
    }
}
