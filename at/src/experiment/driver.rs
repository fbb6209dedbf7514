//! Experiment driver
//!
//! For every prompt: ask the scenario questions under a response schema, then
//! (optionally) continue the same conversation into the test-generation loop,
//! and persist the answer, the generated test and one statistics row.

use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::discovery::{Dataset, PromptFile, ScenarioKind};
use super::folder::ExperimentFolder;
use crate::config::{ResponseFormat, RetryConfig};
use crate::conversation::{Conversation, Turn};
use crate::llm::{GenerationOptions, Generator, HeuristicEstimator, TokenEstimator};
use crate::prompts::PromptLoader;
use crate::retry::{LoopOutcome, RetryOrchestrator};
use crate::stats::{PromptStatistics, StatisticsRecorder, count_characters};
use crate::validator::{BugTarget, BuildValidator, DiagnosticCompressor};

/// Run parameters, saved as `arguments.json`
#[derive(Debug, Clone, Serialize)]
pub struct RunArguments {
    pub model: String,
    pub backend_model: String,
    pub scenario: ScenarioKind,
    pub dataset: Dataset,
    pub version: u32,
    pub projects: Vec<String>,
    pub queries: Vec<String>,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub few_shots: Option<PathBuf>,
    pub format: ResponseFormat,
    pub test_generation: bool,
}

/// Knobs of a driver run
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Prompts estimated above this many tokens are skipped
    pub context_limit: u32,
    pub queries: Vec<String>,
    pub options: GenerationOptions,
    pub retry: RetryConfig,
    pub compressor: DiagnosticCompressor,
    pub response_format: ResponseFormat,
    pub test_generation: bool,
}

/// What happened to one prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// Too large for the model's context window
    Skipped,
    Completed {
        stats: PromptStatistics,
        outcome: Option<LoopOutcome>,
    },
}

/// Counts over a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperimentSummary {
    pub completed: usize,
    pub skipped: usize,
    pub aborted: usize,
    /// Completed prompts whose generated test failed as required
    pub succeeded: usize,
}

/// JSON schema asking for one string answer per query id
pub fn answer_schema(queries: &[String]) -> serde_json::Value {
    let properties: serde_json::Map<String, serde_json::Value> = queries
        .iter()
        .map(|q| (q.clone(), serde_json::json!({"type": "string"})))
        .collect();
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": queries,
    })
}

/// Load few-shot turns from a JSON array of `{role, content}` objects
pub fn load_few_shots(path: &Path) -> Result<Vec<Turn>> {
    debug!(?path, "load_few_shots: called");
    let content = std::fs::read_to_string(path).context(format!("Failed to read few-shots {}", path.display()))?;
    serde_json::from_str(&content).context(format!("Failed to parse few-shots {}", path.display()))
}

pub struct ExperimentDriver<'a> {
    generator: &'a dyn Generator,
    validator: &'a dyn BuildValidator,
    prompts: &'a PromptLoader,
    estimator: Box<dyn TokenEstimator>,
    settings: DriverSettings,
    few_shots: Vec<Turn>,
}

impl<'a> ExperimentDriver<'a> {
    pub fn new(
        generator: &'a dyn Generator,
        validator: &'a dyn BuildValidator,
        prompts: &'a PromptLoader,
        settings: DriverSettings,
    ) -> Self {
        Self {
            generator,
            validator,
            prompts,
            estimator: Box::new(HeuristicEstimator),
            settings,
            few_shots: Vec::new(),
        }
    }

    pub fn with_few_shots(mut self, turns: Vec<Turn>) -> Self {
        self.few_shots = turns;
        self
    }

    /// Opening conversation: system, few-shots, then the prompt as a user turn
    fn open_conversation(&self, prompt_text: &str) -> Result<Conversation> {
        let mut conversation = Conversation::new(self.prompts.system()?);
        conversation
            .extend(self.few_shots.iter().cloned())
            .context("Few-shot turns must alternate user and assistant, starting with user")?;
        conversation.push_user(prompt_text)?;
        Ok(conversation)
    }

    /// Process one prompt end to end
    pub async fn run_prompt(
        &self,
        prompt: &PromptFile,
        folder: &ExperimentFolder,
        recorder: &mut dyn StatisticsRecorder,
    ) -> Result<PromptOutcome> {
        debug!(path = ?prompt.path, "run_prompt: called");
        let text = std::fs::read_to_string(&prompt.path).context(format!("Failed to read {}", prompt.path.display()))?;

        let estimate = self.estimator.estimate(&text);
        if estimate > u64::from(self.settings.context_limit) {
            warn!(path = ?prompt.path, estimate, limit = self.settings.context_limit, "Prompt exceeds context limit");
            folder.log_note(&format!("Ignore {} due to context limit!", prompt.path.display()))?;
            return Ok(PromptOutcome::Skipped);
        }

        let mut conversation = self.open_conversation(&text)?;
        let options = self
            .settings
            .options
            .clone()
            .with_schema(answer_schema(&self.settings.queries));
        let answer = self.generator.generate(&conversation, &options).await?;
        info!(project = %prompt.project_id, bug = prompt.bug_id, "Scenario answer received");

        let mut stats = PromptStatistics::new(prompt.project_id.clone(), prompt.bug_id);
        let mut outcome = None;
        if self.settings.test_generation {
            conversation.push_assistant(answer.content.clone())?;
            conversation.push_user(self.prompts.test_generation()?)?;

            let target = BugTarget {
                project_id: prompt.project_id.clone(),
                bug_id: prompt.bug_id,
                session_id: Uuid::now_v7().to_string(),
            };
            let report = RetryOrchestrator::new(self.generator, self.validator, self.prompts)
                .with_limits(self.settings.retry)
                .with_options(self.settings.options.clone())
                .with_compressor(self.settings.compressor.clone())
                .run(&target, conversation)
                .await?;
            stats = report.stats;
            outcome = Some(report.outcome);
        }

        stats.elapsed_nanoseconds = answer.elapsed_nanos();
        stats.tokens = answer.tokens_used.or(Some(estimate));
        stats.characters = Some(count_characters(&text));

        match self.settings.response_format {
            ResponseFormat::Txt => folder.write_file(&prompt.result_name(), &answer.content)?,
            ResponseFormat::Jsonline => folder.append_result(&prompt.project_id, prompt.bug_id, &answer.content)?,
        }
        if let Some(artifact) = outcome.as_ref().and_then(LoopOutcome::artifact) {
            folder.write_file(&prompt.testcase_name(), &artifact.source)?;
        }
        recorder.record(&stats)?;

        Ok(PromptOutcome::Completed { stats, outcome })
    }

    /// Process prompts one after another; a failing prompt is logged and skipped
    pub async fn run_all(
        &self,
        prompts: &[PromptFile],
        folder: &ExperimentFolder,
        recorder: &mut dyn StatisticsRecorder,
    ) -> Result<ExperimentSummary> {
        info!(count = prompts.len(), folder = ?folder.path(), "Starting experiment");
        let mut summary = ExperimentSummary::default();

        for (index, prompt) in prompts.iter().enumerate() {
            info!("{} - {}", index + 1, prompt.path.display());
            match self.run_prompt(prompt, folder, recorder).await {
                Ok(PromptOutcome::Skipped) => summary.skipped += 1,
                Ok(PromptOutcome::Completed { outcome, .. }) => {
                    summary.completed += 1;
                    if outcome.as_ref().is_some_and(LoopOutcome::is_success) {
                        summary.succeeded += 1;
                    }
                }
                Err(e) => {
                    error!(path = ?prompt.path, error = %e, "Prompt aborted");
                    folder.log_note(&format!("Abort {}: {:#}", prompt.path.display(), e))?;
                    summary.aborted += 1;
                }
            }
        }

        info!(?summary, "Experiment finished");
        Ok(summary)
    }
}
