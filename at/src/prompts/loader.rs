//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to the
//! embedded defaults, and renders them with handlebars.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::embedded;
use crate::extract::SyntaxError;

/// Override directory, relative to the working directory
pub const OVERRIDE_DIR: &str = ".autotester/prompts";

/// Prompt errors
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template not found: {0}")]
    NotFound(String),

    #[error("failed to read prompt {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render template {name}: {source}")]
    Render {
        name: &'static str,
        #[source]
        source: handlebars::RenderError,
    },
}

/// Templates used to build and steer a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    System,
    TestGeneration,
    ParseFailure,
    SyntaxError,
    CompileError,
    CompileErrorGeneric,
    WeakAssertion,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::TestGeneration => "test-generation",
            Self::ParseFailure => "parse-failure",
            Self::SyntaxError => "syntax-error",
            Self::CompileError => "compile-error",
            Self::CompileErrorGeneric => "compile-error-generic",
            Self::WeakAssertion => "weak-assertion",
        }
    }
}

#[derive(Serialize)]
struct LanguageContext<'a> {
    language: &'a str,
}

#[derive(Serialize)]
struct SyntaxContext<'a> {
    description: &'a str,
    position: String,
}

#[derive(Serialize)]
struct DigestContext<'a> {
    digest: &'a str,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.autotester/prompts/`)
    user_dir: Option<PathBuf>,
    /// Language named in the generation and parse-failure prompts
    language: String,
}

impl PromptLoader {
    /// Create a loader that honours overrides under `root/.autotester/prompts`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let user_dir = root.as_ref().join(OVERRIDE_DIR);
        let exists = user_dir.is_dir();
        debug!(?user_dir, %exists, "PromptLoader::new: called");
        Self {
            hbs: Handlebars::new(),
            user_dir: exists.then_some(user_dir),
            language: "Java".to_string(),
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Handlebars::new(),
            user_dir: None,
            language: "Java".to_string(),
        }
    }

    /// Load a template by name
    ///
    /// Checks `<override dir>/{name}.pmt` first, then the embedded set.
    fn load_template(&self, name: &str) -> Result<String, PromptError> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref user_dir) = self.user_dir {
            let path = user_dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in user override");
                return std::fs::read_to_string(&path).map_err(|source| PromptError::Read { path, source });
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| PromptError::NotFound(name.to_string()))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template: Template, context: &T) -> Result<String, PromptError> {
        debug!(name = template.name(), "PromptLoader::render: called");
        let source = self.load_template(template.name())?;
        self.hbs
            .render_template(&source, context)
            .map(|rendered| rendered.trim_end().to_string())
            .map_err(|source| PromptError::Render {
                name: template.name(),
                source,
            })
    }

    fn render_language(&self, template: Template) -> Result<String, PromptError> {
        self.render(
            template,
            &LanguageContext {
                language: &self.language,
            },
        )
    }

    pub fn system(&self) -> Result<String, PromptError> {
        self.render_language(Template::System)
    }

    /// User turn asking for a test case after the scenario answer
    pub fn test_generation(&self) -> Result<String, PromptError> {
        self.render_language(Template::TestGeneration)
    }

    pub fn parse_failure(&self) -> Result<String, PromptError> {
        self.render_language(Template::ParseFailure)
    }

    pub fn syntax_error(&self, error: &SyntaxError) -> Result<String, PromptError> {
        self.render(
            Template::SyntaxError,
            &SyntaxContext {
                description: &error.description,
                position: error.position(),
            },
        )
    }

    /// Compile feedback; the generic message when there is no digest
    pub fn compile_error(&self, digest: Option<&str>) -> Result<String, PromptError> {
        match digest {
            Some(digest) => self.render(Template::CompileError, &DigestContext { digest }),
            None => self.render_language(Template::CompileErrorGeneric),
        }
    }

    pub fn weak_assertion(&self) -> Result<String, PromptError> {
        self.render_language(Template::WeakAssertion)
    }
}
