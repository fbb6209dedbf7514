//! Prompt templates for conversations and corrective feedback

mod embedded;
mod loader;

pub use embedded::get_embedded;
pub use loader::{OVERRIDE_DIR, PromptError, PromptLoader, Template};
