//! Generation request/response types
//!
//! Backend-agnostic: adapters translate these to and from their wire formats.

use std::time::Duration;

use crate::config::GenerationConfig;

/// Per-call options
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Sampling temperature
    pub temperature: f32,

    /// Sampling seed, ignored by backends without one
    pub seed: Option<u64>,

    /// Max tokens for the response
    pub max_tokens: u32,

    /// JSON schema the response must follow, honored by schema-capable backends
    pub response_schema: Option<serde_json::Value>,
}

impl GenerationOptions {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            seed: config.seed,
            max_tokens: config.max_tokens,
            response_schema: None,
        }
    }

    /// Same options, constrained to a response schema
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::from_config(&GenerationConfig::default())
    }
}

/// Result of one generation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Generated text
    pub content: String,

    /// Prompt tokens, when the backend reports or the caller estimates them
    pub tokens_used: Option<u64>,

    /// Wall time of the call, when the backend reports or the caller measures it
    pub elapsed: Option<Duration>,
}

impl Generation {
    /// Text-only generation without usage metadata
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tokens_used: None,
            elapsed: None,
        }
    }

    /// Elapsed time in nanoseconds, saturating at `u64::MAX`
    pub fn elapsed_nanos(&self) -> Option<u64> {
        self.elapsed.map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = GenerationConfig {
            temperature: 0.1,
            seed: Some(3),
            max_tokens: 64,
        };
        let options = GenerationOptions::from_config(&config);
        assert_eq!(options.temperature, 0.1);
        assert_eq!(options.seed, Some(3));
        assert!(options.response_schema.is_none());

        let schema = serde_json::json!({"type": "object"});
        let constrained = options.with_schema(schema.clone());
        assert_eq!(constrained.response_schema, Some(schema));
    }

    #[test]
    fn test_elapsed_nanos() {
        let mut generation = Generation::text("x");
        assert_eq!(generation.elapsed_nanos(), None);
        generation.elapsed = Some(Duration::from_millis(2));
        assert_eq!(generation.elapsed_nanos(), Some(2_000_000));
    }
}
