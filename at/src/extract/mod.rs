//! Code block extraction from model output
//!
//! A response is usable when it holds exactly one fenced block tagged with the
//! target language and that block parses as Java.

mod fence;
mod syntax;

use thiserror::Error;
use tracing::debug;

pub use fence::{FencedBlock, fenced_blocks};
pub use syntax::{ArtifactShape, CheckedSource, SyntaxError, check_java};

/// Why a response did not yield exactly one code block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("no code block found")]
    NoCodeBlock,

    #[error("expected one code block, found {0}")]
    MultipleCodeBlocks(usize),
}

/// Extraction failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("parse failure: {0}")]
    Parse(#[from] ParseFailure),

    #[error("syntax error: {0}")]
    Syntax(SyntaxError),
}

/// A syntactically valid test candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Block text as the model wrote it
    pub source: String,
    /// Text to splice into a test class body
    pub insertable: String,
    pub shape: ArtifactShape,
    /// Declared method names, in source order
    pub test_methods: Vec<String>,
}

/// Extracts one code block of a target language from raw model output
#[derive(Debug, Clone)]
pub struct CodeBlockExtractor {
    language: String,
}

impl Default for CodeBlockExtractor {
    fn default() -> Self {
        Self::new("java")
    }
}

impl CodeBlockExtractor {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Extract and syntax-check the single code block in `text`
    pub fn extract(&self, text: &str) -> Result<GeneratedArtifact, ExtractError> {
        debug!(len = text.len(), language = %self.language, "extract: called");
        let mut blocks: Vec<FencedBlock> = fenced_blocks(text)
            .into_iter()
            .filter(|b| b.language().eq_ignore_ascii_case(&self.language))
            .collect();

        let block = match blocks.len() {
            0 => return Err(ParseFailure::NoCodeBlock.into()),
            1 => blocks.remove(0),
            n => return Err(ParseFailure::MultipleCodeBlocks(n).into()),
        };

        let checked = check_java(&block.body).map_err(ExtractError::Syntax)?;
        debug!(methods = ?checked.methods, shape = ?checked.shape, "extract: block accepted");

        Ok(GeneratedArtifact {
            source: block.body,
            insertable: checked.insertable,
            shape: checked.shape,
            test_methods: checked.methods,
        })
    }
}
