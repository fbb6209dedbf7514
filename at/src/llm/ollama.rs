//! Ollama chat client
//!
//! Schema-constrained chat: the `format` field carries the response schema and
//! the server reports `total_duration` (ns) and `prompt_eval_count` itself.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::transport::send_with_retry;
use super::{Generation, GenerationOptions, Generator, LlmError};
use crate::config::ResolvedModel;
use crate::conversation::Conversation;

/// Ollama API client
pub struct OllamaClient {
    id: String,
    model: String,
    base_url: String,
    context_limit: u32,
    http: Client,
}

impl OllamaClient {
    pub fn from_config(config: &ResolvedModel) -> Result<Self, LlmError> {
        debug!(?config, "OllamaClient::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            id: config.id.clone(),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            context_limit: config.context_limit,
            http,
        })
    }

    fn build_request_body(&self, conversation: &Conversation, options: &GenerationOptions) -> serde_json::Value {
        debug!(%self.model, turns = conversation.len(), "OllamaClient::build_request_body: called");
        let mut model_options = serde_json::json!({
            "temperature": options.temperature,
            "num_ctx": self.context_limit,
        });
        if let Some(seed) = options.seed {
            model_options["seed"] = serde_json::json!(seed);
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": conversation.turns(),
            "options": model_options,
            "stream": false,
        });

        if let Some(schema) = &options.response_schema {
            body["format"] = schema.clone();
        }

        body
    }

    fn parse_response(&self, api_response: OllamaResponse) -> Generation {
        debug!(
            total_duration = ?api_response.total_duration,
            prompt_eval_count = ?api_response.prompt_eval_count,
            "OllamaClient::parse_response: called"
        );
        Generation {
            content: api_response.message.content,
            tokens_used: api_response.prompt_eval_count,
            elapsed: api_response.total_duration.map(Duration::from_nanos),
        }
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, conversation: &Conversation, options: &GenerationOptions) -> Result<Generation, LlmError> {
        debug!(%self.model, "OllamaClient::generate: called");
        let url = format!("{}/api/chat", self.base_url);
        let body = self.build_request_body(conversation, options);

        let response = send_with_retry(|| {
            self.http
                .post(&url)
                .header("content-type", "application/json")
                .json(&body)
        })
        .await?;

        let api_response: OllamaResponse = response.json().await?;
        Ok(self.parse_response(api_response))
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    total_duration: Option<u64>,
    prompt_eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: String,
}
