//! OpenAI API client implementation
//!
//! Plain chat without a response schema. Prompt tokens come from the `usage`
//! block; elapsed time is filled in by [`super::MeteredGenerator`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::transport::send_with_retry;
use super::{Generation, GenerationOptions, Generator, LlmError};
use crate::config::ResolvedModel;
use crate::conversation::Conversation;

/// OpenAI API client
pub struct OpenAIClient {
    id: String,
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAIClient {
    /// Create a new client from a resolved model table entry
    pub fn from_config(config: &ResolvedModel) -> Result<Self, LlmError> {
        debug!(?config, "from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;

        let timeout = Duration::from_millis(config.timeout_ms);

        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            id: config.id.clone(),
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
        })
    }

    /// Build the request body for the OpenAI API
    fn build_request_body(&self, conversation: &Conversation, options: &GenerationOptions) -> serde_json::Value {
        debug!(%self.model, turns = conversation.len(), "build_request_body: called");

        let messages: Vec<serde_json::Value> = conversation
            .turns()
            .iter()
            .map(|turn| {
                serde_json::json!({
                    "role": turn.role.as_str(),
                    "content": turn.content,
                })
            })
            .collect();

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            self.model.starts_with("gpt-5") || self.model.starts_with("o1") || self.model.starts_with("o3");

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": options.temperature,
            "top_p": 0.95,
            "frequency_penalty": 0,
            "presence_penalty": 0,
        });

        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(options.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(options.max_tokens);
        }

        if let Some(seed) = options.seed {
            body["seed"] = serde_json::json!(seed);
        }

        if options.response_schema.is_some() {
            debug!("build_request_body: response schema not enforced by this backend");
        }

        body
    }

    /// Parse the OpenAI API response
    fn parse_response(&self, api_response: OpenAIResponse) -> Result<Generation, LlmError> {
        debug!(choices = api_response.choices.len(), "parse_response: called");
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        let mut generation = Generation::text(choice.message.content.unwrap_or_default());
        generation.tokens_used = api_response.usage.map(|u| u.prompt_tokens);
        Ok(generation)
    }
}

#[async_trait]
impl Generator for OpenAIClient {
    async fn generate(&self, conversation: &Conversation, options: &GenerationOptions) -> Result<Generation, LlmError> {
        debug!(%self.model, "generate: called");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(conversation, options);

        let response = send_with_retry(|| {
            self.http
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("content-type", "application/json")
                .json(&body)
        })
        .await?;

        let api_response: OpenAIResponse = response.json().await?;
        self.parse_response(api_response)
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(model: &str) -> OpenAIClient {
        OpenAIClient {
            id: "gpt4o".to_string(),
            model: model.to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.openai.com".to_string(),
            http: Client::new(),
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let client = client("gpt-4o");
        let mut conv = Conversation::new("You are helpful");
        conv.push_user("Hello").unwrap();

        let options = GenerationOptions {
            temperature: 0.5,
            seed: Some(11),
            max_tokens: 800,
            response_schema: None,
        };
        let body = client.build_request_body(&conv, &options);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["seed"], 11);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_completion_tokens_for_reasoning_models() {
        let client = client("o3-mini");
        let body = client.build_request_body(&Conversation::new("s"), &GenerationOptions::default());
        assert_eq!(body["max_completion_tokens"], 800);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn test_parse_response() {
        let client = client("gpt-4o");
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"```java\n```"}}],"usage":{"prompt_tokens":3}}"#;
        let api_response: OpenAIResponse = serde_json::from_str(raw).unwrap();
        let generation = client.parse_response(api_response).unwrap();
        assert_eq!(generation.content, "```java\n```");
        assert_eq!(generation.tokens_used, Some(3));
        assert!(generation.elapsed.is_none());

        let empty: OpenAIResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(client.parse_response(empty).is_err());
    }
}
