//! AutoTester configuration types and loading

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::validator::DEFAULT_LIMIT;

/// Main AutoTester configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Model table and default model
    pub llm: LlmConfig,

    /// Sampling parameters for every generation call
    pub generation: GenerationConfig,

    /// Retry budgets for the feedback loop
    pub retry: RetryConfig,

    /// Build validator (defects4j) settings
    pub validator: ValidatorConfig,

    /// Prompt and result locations
    pub experiment: ExperimentConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the selected model exists and that its API key is available,
    /// that every retry budget allows at least one fix and that the diagnostic
    /// digest stays within its bound.
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self, model_id: Option<&str>) -> Result<()> {
        debug!(?model_id, "Config::validate: called");
        let limits = [
            ("max-syntax-fixes", self.retry.max_syntax_fixes),
            ("max-compilation-fixes", self.retry.max_compilation_fixes),
            ("max-assertion-fixes", self.retry.max_assertion_fixes),
        ];
        if let Some((key, _)) = limits.iter().find(|(_, limit)| *limit == 0) {
            return Err(eyre!("retry.{} must be at least 1", key));
        }
        if self.validator.digest_limit > DEFAULT_LIMIT {
            return Err(eyre!(
                "validator.digest-limit must not exceed {} characters (got {})",
                DEFAULT_LIMIT,
                self.validator.digest_limit
            ));
        }

        let resolved = self.llm.resolve(model_id)?;
        resolved.get_api_key()?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .autotester.yml
        let local_config = PathBuf::from(".autotester.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/autotester/autotester.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("autotester").join("autotester.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates: Vec<PathBuf> = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".autotester.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("autotester").join("autotester.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Self>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Backend family serving a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local Ollama server; supports schema-constrained chat
    Ollama,
    /// OpenAI chat completions; plain chat
    #[serde(rename = "openai")]
    OpenAI,
}

impl Provider {
    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAI => "https://api.openai.com",
        }
    }

    fn default_api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::Ollama => None,
            Provider::OpenAI => Some("OPENAI_API_KEY"),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::OpenAI => write!(f, "openai"),
        }
    }
}

/// One entry of the model table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Backend family
    pub provider: Provider,

    /// Model name as the backend knows it
    pub model: String,

    /// Context window in tokens; longer prompts are skipped
    #[serde(rename = "context-limit")]
    pub context_limit: u32,

    /// API base URL (provider default when absent)
    #[serde(rename = "base-url", default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable containing the API key (provider default when absent)
    #[serde(rename = "api-key-env", default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Short human description shown by `at models`
    #[serde(default)]
    pub description: String,
}

fn default_timeout_ms() -> u64 {
    300_000
}

impl ModelSpec {
    fn new(provider: Provider, model: &str, context_limit: u32, description: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
            context_limit,
            base_url: None,
            api_key_env: None,
            timeout_ms: default_timeout_ms(),
            description: description.to_string(),
        }
    }
}

/// Model table keyed by model id, plus the default selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model id used when none is given on the command line
    pub default: String,

    /// Model id -> backend details
    pub models: BTreeMap<String, ModelSpec>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        use Provider::{Ollama, OpenAI};

        let entries = [
            ("gpt35-turbo", ModelSpec::new(OpenAI, "gpt-3.5-turbo", 16385, "OpenAI GPT-3.5 Turbo")),
            (
                "gpt35-ft",
                ModelSpec::new(
                    OpenAI,
                    "ft:gpt-3.5-turbo-0125:personal:defects4j-atest:9gx7pSLJ",
                    16385,
                    "OpenAI GPT-3.5 fine-tuned on Defects4J",
                ),
            ),
            ("gpt4", ModelSpec::new(OpenAI, "gpt-4", 8192, "OpenAI GPT-4")),
            ("gpt4-turbo", ModelSpec::new(OpenAI, "gpt-4-turbo", 128000, "OpenAI GPT-4 Turbo")),
            ("gpt4o", ModelSpec::new(OpenAI, "gpt-4o", 128000, "OpenAI GPT-4o")),
            ("llama2-7b", ModelSpec::new(Ollama, "llama2", 4096, "Meta Llama 2 7B")),
            ("llama3-8b", ModelSpec::new(Ollama, "llama3:8b", 8192, "Meta Llama 3 8B")),
            ("llama3-70b", ModelSpec::new(Ollama, "llama3:70b", 8192, "Meta Llama 3 70B")),
            ("llama3.1-8b", ModelSpec::new(Ollama, "llama3.1", 8192, "Meta Llama 3.1 8B")),
            ("llama3.2-1b", ModelSpec::new(Ollama, "llama3.2:1b", 8192, "Meta Llama 3.2 1B")),
            ("llama3.2-3b", ModelSpec::new(Ollama, "llama3.2:3b", 8192, "Meta Llama 3.2 3B")),
            ("llama3.3-70b", ModelSpec::new(Ollama, "llama3.3", 8192, "Meta Llama 3.3 70B")),
            ("gemma2-27b", ModelSpec::new(Ollama, "gemma2:27b", 8192, "Google Gemma 2 27B")),
            ("deepseek-r1-1.5b", ModelSpec::new(Ollama, "deepseek-r1:1.5b", 8192, "DeepSeek R1 1.5B")),
            ("deepseek-r1-7b", ModelSpec::new(Ollama, "deepseek-r1:7b", 8192, "DeepSeek R1 7B")),
            ("deepseek-r1-14b", ModelSpec::new(Ollama, "deepseek-r1:14b", 8192, "DeepSeek R1 14B")),
            ("deepseek-r1-32b", ModelSpec::new(Ollama, "deepseek-r1:32b", 8192, "DeepSeek R1 32B")),
            ("deepseek-r1-70b", ModelSpec::new(Ollama, "deepseek-r1:70b", 8192, "DeepSeek R1 70B")),
        ];

        Self {
            default: "llama3.1-8b".to_string(),
            models: entries.into_iter().map(|(id, spec)| (id.to_string(), spec)).collect(),
        }
    }
}

impl LlmConfig {
    /// Resolve a model id (or the default) into a fully populated model description
    pub fn resolve(&self, model_id: Option<&str>) -> Result<ResolvedModel> {
        let id = model_id.unwrap_or(&self.default);
        debug!(%id, "LlmConfig::resolve: called");
        let spec = self.models.get(id).ok_or_else(|| {
            eyre!(
                "Unknown model '{}'. Known models: {}",
                id,
                self.models.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })?;

        Ok(ResolvedModel {
            id: id.to_string(),
            provider: spec.provider,
            model: spec.model.clone(),
            base_url: spec
                .base_url
                .clone()
                .unwrap_or_else(|| spec.provider.default_base_url().to_string()),
            api_key_env: spec
                .api_key_env
                .clone()
                .or_else(|| spec.provider.default_api_key_env().map(str::to_string)),
            context_limit: spec.context_limit,
            timeout_ms: spec.timeout_ms,
        })
    }
}

/// A model table entry with provider defaults filled in
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub id: String,
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key_env: Option<String>,
    pub context_limit: u32,
    pub timeout_ms: u64,
}

impl ResolvedModel {
    /// Read the API key from the configured environment variable
    ///
    /// Providers without an API key return an empty string.
    pub fn get_api_key(&self) -> Result<String> {
        match &self.api_key_env {
            Some(var) => std::env::var(var).map_err(|_| {
                eyre!(
                    "API key for model '{}' not found. Set the {} environment variable.",
                    self.id,
                    var
                )
            }),
            None => Ok(String::new()),
        }
    }
}

/// Sampling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Higher is more creative, lower is more coherent
    pub temperature: f32,

    /// Sampling seed, when the backend supports one
    pub seed: Option<u64>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.75,
            seed: None,
            max_tokens: 800,
        }
    }
}

/// Retry budgets of the feedback loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-syntax-fixes")]
    pub max_syntax_fixes: u32,

    #[serde(rename = "max-compilation-fixes")]
    pub max_compilation_fixes: u32,

    #[serde(rename = "max-assertion-fixes")]
    pub max_assertion_fixes: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_syntax_fixes: 5,
            max_compilation_fixes: 5,
            max_assertion_fixes: 5,
        }
    }
}

/// Build validator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Path to the defects4j executable
    pub defects4j: PathBuf,

    /// Root directory for per-session checkouts
    #[serde(rename = "work-dir")]
    pub work_dir: PathBuf,

    /// Checkout version suffix ("b" for buggy, "f" for fixed)
    #[serde(rename = "version-suffix")]
    pub version_suffix: String,

    /// Timeout for each defects4j invocation in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Token marking compiler lines in build output
    pub marker: String,

    /// Upper bound on the compressed diagnostic, in characters
    #[serde(rename = "digest-limit")]
    pub digest_limit: usize,

    /// Leave session checkouts on disk after a run
    #[serde(rename = "keep-checkouts")]
    pub keep_checkouts: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            defects4j: PathBuf::from("defects4j"),
            work_dir: std::env::temp_dir().join("autotester").join("checkouts"),
            version_suffix: "b".to_string(),
            timeout_ms: 600_000,
            marker: "[javac]".to_string(),
            digest_limit: 10_000,
            keep_checkouts: false,
        }
    }
}

/// How scenario answers are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// One `<prompt>_result.txt` per prompt
    Txt,
    /// All answers appended to `results.jsonl`
    Jsonline,
}

/// Prompt and result locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Root of the prompt dataset (`v<version>/<queries>/prompt_*.txt`)
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: PathBuf,

    /// Root under which experiment folders are created
    #[serde(rename = "results-dir")]
    pub results_dir: PathBuf,

    /// Output format of scenario answers
    #[serde(rename = "response-format")]
    pub response_format: ResponseFormat,

    /// Run the test-case generation loop after the scenario answer
    #[serde(rename = "test-generation")]
    pub test_generation: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            prompts_dir: PathBuf::from("prompts"),
            results_dir: PathBuf::from("results"),
            response_format: ResponseFormat::Txt,
            test_generation: true,
        }
    }
}
