//! Metering decorator for generators that do not report usage

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{Generation, GenerationOptions, Generator, LlmError};
use crate::conversation::Conversation;

/// Counts tokens in a text
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u64;
}

/// Whitespace-and-punctuation heuristic
///
/// Counts words plus half the ASCII punctuation.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        let word_count = text.split_whitespace().count();
        let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();
        (word_count + punct_count / 2) as u64
    }
}

/// Wraps a generator, filling in elapsed time and prompt tokens when missing
pub struct MeteredGenerator {
    inner: Arc<dyn Generator>,
    estimator: Arc<dyn TokenEstimator>,
}

impl MeteredGenerator {
    pub fn new(inner: Arc<dyn Generator>, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { inner, estimator }
    }
}

#[async_trait]
impl Generator for MeteredGenerator {
    async fn generate(&self, conversation: &Conversation, options: &GenerationOptions) -> Result<Generation, LlmError> {
        let start = Instant::now();
        let mut generation = self.inner.generate(conversation, options).await?;
        let measured = start.elapsed();

        if generation.elapsed.is_none() {
            generation.elapsed = Some(measured);
        }
        if generation.tokens_used.is_none() {
            generation.tokens_used = Some(self.estimator.estimate(&conversation.text()));
        }
        debug!(
            model = self.inner.model_id(),
            tokens = ?generation.tokens_used,
            elapsed = ?generation.elapsed,
            "MeteredGenerator::generate: done"
        );
        Ok(generation)
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockGenerator;
    use std::time::Duration;

    #[test]
    fn test_heuristic_estimator() {
        let estimator = HeuristicEstimator;
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("Hello"), 1);
        // 2 words + 2 punctuation / 2
        assert_eq!(estimator.estimate("Hello, world!"), 3);
        assert!(estimator.estimate("assertEquals(1, foo.bar());") >= 2);
    }

    #[tokio::test]
    async fn test_fills_missing_metadata() {
        let inner = Arc::new(MockGenerator::new(["answer"]));
        let metered = MeteredGenerator::new(inner, Arc::new(HeuristicEstimator));
        let mut conv = Conversation::new("system prompt");
        conv.push_user("two words").unwrap();

        let generation = metered.generate(&conv, &GenerationOptions::default()).await.unwrap();

        assert_eq!(generation.content, "answer");
        assert_eq!(generation.tokens_used, Some(4));
        assert!(generation.elapsed.is_some());
        assert_eq!(metered.model_id(), "mock");
    }

    #[tokio::test]
    async fn test_keeps_reported_metadata() {
        let reported = Generation {
            content: "x".to_string(),
            tokens_used: Some(26),
            elapsed: Some(Duration::from_nanos(99)),
        };
        let inner = Arc::new(MockGenerator::from_results([Ok(reported.clone())]));
        let metered = MeteredGenerator::new(inner, Arc::new(HeuristicEstimator));

        let generation = metered
            .generate(&Conversation::new("sys"), &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(generation, reported);
    }
}
