//! Generator trait definition

use async_trait::async_trait;

use super::{Generation, GenerationOptions, LlmError};
use crate::conversation::Conversation;

/// A text-generation backend
///
/// Each call receives the whole conversation so far; the backend keeps no
/// state between calls. Adapters hide backend differences (schema support,
/// usage reporting) so callers never branch on which backend is in use.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate the next assistant turn for `conversation`
    async fn generate(&self, conversation: &Conversation, options: &GenerationOptions) -> Result<Generation, LlmError>;

    /// Model id from the model table (used in folder names and logs)
    fn model_id(&self) -> &str;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    /// Scripted generator for unit tests
    ///
    /// Replays `responses` in order and records every conversation it is shown.
    pub struct MockGenerator {
        responses: Vec<Result<Generation, String>>,
        call_count: AtomicUsize,
        seen: Mutex<Vec<Conversation>>,
    }

    impl MockGenerator {
        pub fn new<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
            Self::from_results(responses.into_iter().map(|r| Ok(Generation::text(r))))
        }

        /// Script that may include failures (`Err(message)`)
        pub fn from_results(responses: impl IntoIterator<Item = Result<Generation, String>>) -> Self {
            let responses: Vec<_> = responses.into_iter().collect();
            debug!(response_count = %responses.len(), "MockGenerator::new: called");
            Self {
                responses,
                call_count: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        pub fn seen(&self) -> Vec<Conversation> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl Generator for MockGenerator {
        async fn generate(
            &self,
            conversation: &Conversation,
            _options: &GenerationOptions,
        ) -> Result<Generation, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            debug!(%idx, "MockGenerator::generate: fetching response");
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(conversation.clone());
            }
            match self.responses.get(idx) {
                Some(Ok(generation)) => Ok(generation.clone()),
                Some(Err(message)) => Err(LlmError::InvalidResponse(message.clone())),
                None => Err(LlmError::InvalidResponse("No more mock responses".to_string())),
            }
        }

        fn model_id(&self) -> &str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_generator_returns_responses() {
            let generator = MockGenerator::new(["Response 1", "Response 2"]);
            let conv = Conversation::new("sys");
            let options = GenerationOptions::default();

            let first = generator.generate(&conv, &options).await.unwrap();
            assert_eq!(first.content, "Response 1");

            let second = generator.generate(&conv, &options).await.unwrap();
            assert_eq!(second.content, "Response 2");

            assert_eq!(generator.call_count(), 2);
            assert_eq!(generator.seen().len(), 2);
        }

        #[tokio::test]
        async fn test_mock_generator_errors_when_exhausted() {
            let generator = MockGenerator::new(Vec::<String>::new());
            let result = generator
                .generate(&Conversation::new("sys"), &GenerationOptions::default())
                .await;
            assert!(result.is_err());
        }
    }
}
