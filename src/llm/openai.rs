//! Chat-completions HTTP client
//!
//! Direct HTTP client for an OpenAI-style chat-completions endpoint.
//! Used by the Plan Generator for structured JSON plans and by the
//! compare/synthesize tools for free-form analysis text.

use async_trait::async_trait;

use crate::llm::types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
use crate::llm::{CompletionClient, CompletionError};

const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client backed by `reqwest`
///
/// The client is cheap to clone; it shares the underlying connection pool
/// with every other HTTP collaborator in the process.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client against the production endpoint
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, model, OPENAI_API_BASE_URL)
    }

    /// Create a client against a custom base URL (for testing)
    pub fn with_base_url(
        client: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        force_json: bool,
    ) -> Result<String, CompletionError> {
        if self.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let request_body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
            response_format: force_json.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        tracing::debug!(
            url = %url,
            model = %self.model,
            force_json = force_json,
            prompt_len = system.len() + user.len(),
            "Calling completion service"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());

            tracing::error!(
                status_code = status_code,
                body = %body,
                "Completion service returned error status"
            );

            if status_code == 429 {
                return Err(CompletionError::RateLimited {
                    status: status_code,
                    body,
                });
            }
            return Err(CompletionError::Api {
                status: status_code,
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Http(e.to_string()))?;

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::Parse(format!("{} - response body: {}", e, body)))?;

        let choice = parsed.choices.first().ok_or(CompletionError::Empty)?;
        let text = choice.message.content.trim();
        if text.is_empty() {
            return Err(CompletionError::Empty);
        }

        tracing::debug!(response_len = text.len(), "Received completion");

        Ok(text.to_string())
    }
}
