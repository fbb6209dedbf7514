//! Generation capability
//!
//! One [`Generator`] trait with an adapter per backend family. Backends that
//! do not report timing or usage are wrapped in [`MeteredGenerator`], so every
//! generator handed out by [`create_generator`] returns both.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod metered;
mod ollama;
mod openai;
mod transport;
mod types;

pub use client::Generator;
pub use error::LlmError;
pub use metered::{HeuristicEstimator, MeteredGenerator, TokenEstimator};
pub use ollama::OllamaClient;
pub use openai::OpenAIClient;
pub use types::{Generation, GenerationOptions};

use crate::config::{Provider, ResolvedModel};

/// Create a metered generator for a resolved model table entry
pub fn create_generator(config: &ResolvedModel) -> Result<Arc<dyn Generator>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_generator: called");
    let inner: Arc<dyn Generator> = match config.provider {
        Provider::Ollama => Arc::new(OllamaClient::from_config(config)?),
        Provider::OpenAI => Arc::new(OpenAIClient::from_config(config)?),
    };

    Ok(Arc::new(MeteredGenerator::new(inner, Arc::new(HeuristicEstimator))))
}
