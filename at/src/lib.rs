//! AutoTester - LLM test generation with build feedback
//!
//! AutoTester asks a language model whether a method behaves correctly for a
//! new input scenario, then has it write a unit test for that scenario. Each
//! generated test goes through a bounded feedback loop: it is extracted from
//! the model's Markdown, syntax-checked, spliced into the bug's test suite,
//! compiled and run, and every failure is turned into a corrective message.
//!
//! # Modules
//!
//! - [`conversation`] - Append-only turn sequence
//! - [`llm`] - Generator trait with Ollama and OpenAI adapters
//! - [`extract`] - Code block extraction and Java syntax checks
//! - [`validator`] - Build validation via defects4j and diagnostic compression
//! - [`retry`] - The feedback loop and its retry budgets
//! - [`stats`] - Per-prompt statistics
//! - [`experiment`] - Prompt discovery and experiment runs
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod conversation;
pub mod experiment;
pub mod extract;
pub mod llm;
pub mod prompts;
pub mod retry;
pub mod stats;
pub mod validator;

pub use config::Config;
pub use conversation::{Conversation, Role, Turn};
pub use retry::{LoopOutcome, RetryOrchestrator};
