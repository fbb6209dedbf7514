//! The generation and validation feedback loop

use thiserror::Error;
use tracing::{debug, info, warn};

use super::budget::{BudgetKind, RetryBudget};
use crate::config::RetryConfig;
use crate::conversation::{Conversation, ConversationError};
use crate::extract::{CodeBlockExtractor, ExtractError, GeneratedArtifact};
use crate::llm::{GenerationOptions, Generator, LlmError};
use crate::prompts::{PromptError, PromptLoader};
use crate::stats::PromptStatistics;
use crate::validator::{BugTarget, BuildValidator, DiagnosticCompressor, Evaluation, ValidatorError};

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("validation failed: {0}")]
    Validator(#[from] ValidatorError),

    #[error("conversation rejected a turn: {0}")]
    Conversation(#[from] ConversationError),

    #[error("feedback prompt failed: {0}")]
    Prompt(#[from] PromptError),
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The generated test compiled and at least one test failed
    Success {
        artifact: GeneratedArtifact,
        failing_tests: u32,
    },
    /// The test suite had no place for the generated test
    LocationMiss { artifact: GeneratedArtifact },
    /// A retry budget ran out; the last parsed artifact, if any
    BudgetExhausted {
        budget: BudgetKind,
        last_artifact: Option<GeneratedArtifact>,
    },
}

impl LoopOutcome {
    /// The artifact worth keeping from this run
    pub fn artifact(&self) -> Option<&GeneratedArtifact> {
        match self {
            Self::Success { artifact, .. } | Self::LocationMiss { artifact } => Some(artifact),
            Self::BudgetExhausted { last_artifact, .. } => last_artifact.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: LoopOutcome,
    /// Loop counters and flags; timing and prompt size are left unset
    pub stats: PromptStatistics,
    /// Every attempt and corrective turn, in order
    pub conversation: Conversation,
}

/// Drives generate → extract → augment → evaluate until success, a location
/// miss, or an exhausted budget
pub struct RetryOrchestrator<'a> {
    generator: &'a dyn Generator,
    validator: &'a dyn BuildValidator,
    prompts: &'a PromptLoader,
    extractor: CodeBlockExtractor,
    compressor: DiagnosticCompressor,
    options: GenerationOptions,
    limits: RetryConfig,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(generator: &'a dyn Generator, validator: &'a dyn BuildValidator, prompts: &'a PromptLoader) -> Self {
        Self {
            generator,
            validator,
            prompts,
            extractor: CodeBlockExtractor::default(),
            compressor: DiagnosticCompressor::default(),
            options: GenerationOptions::default(),
            limits: RetryConfig::default(),
        }
    }

    pub fn with_limits(mut self, limits: RetryConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_compressor(mut self, compressor: DiagnosticCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Run the loop on `conversation`, which must end with a user turn
    ///
    /// The working copy of `target` is released however the run ends.
    pub async fn run(&self, target: &BugTarget, conversation: Conversation) -> Result<RunReport, RetryError> {
        debug!(?target, turns = conversation.len(), "RetryOrchestrator::run: called");
        let result = self.drive(target, conversation).await;
        if let Err(e) = self.validator.release(target).await {
            warn!(session = %target.session_id, error = %e, "Failed to release working copy");
        }
        result
    }

    async fn drive(&self, target: &BugTarget, mut conversation: Conversation) -> Result<RunReport, RetryError> {
        let mut budget = RetryBudget::new(self.limits);
        let mut stats = PromptStatistics::new(target.project_id.clone(), target.bug_id);
        let mut last_artifact: Option<GeneratedArtifact> = None;
        let mut failing = 0;
        let mut attempt = 0u32;

        let outcome = loop {
            if let Some(kind) = budget.exhausted() {
                info!(%kind, used = budget.used(kind), "Retry budget exhausted");
                break LoopOutcome::BudgetExhausted {
                    budget: kind,
                    last_artifact: last_artifact.clone(),
                };
            }

            attempt += 1;
            debug!(attempt, "RetryOrchestrator::drive: requesting generation");
            let raw = self.generator.generate(&conversation, &self.options).await?.content;

            let (kind, feedback) = match self.extractor.extract(&raw) {
                Err(ExtractError::Parse(reason)) => {
                    debug!(%reason, "RetryOrchestrator::drive: parse failure");
                    stats.has_valid_syntax = Some(false);
                    (BudgetKind::Syntax, self.prompts.parse_failure()?)
                }
                Err(ExtractError::Syntax(error)) => {
                    debug!(%error, "RetryOrchestrator::drive: syntax error");
                    stats.has_valid_syntax = Some(false);
                    (BudgetKind::Syntax, self.prompts.syntax_error(&error)?)
                }
                Ok(artifact) => {
                    stats.has_valid_syntax = Some(true);
                    last_artifact = Some(artifact.clone());

                    let Some(suite) = self.validator.augment(target, &artifact).await? else {
                        info!(project = %target.project_id, bug = target.bug_id, "Trigger test location not found");
                        stats.miss_location = Some(true);
                        break LoopOutcome::LocationMiss { artifact };
                    };

                    match self.validator.evaluate(&suite).await? {
                        Evaluation::CompileFailure(output) => {
                            stats.can_compile = Some(false);
                            let digest = self.compressor.compress(&output);
                            if digest.is_none() {
                                warn!("Compile output has no error line, sending generic feedback");
                            }
                            (BudgetKind::Compilation, self.prompts.compile_error(digest.as_deref())?)
                        }
                        Evaluation::Executed { failing_tests: 0 } => {
                            stats.can_compile = Some(true);
                            failing = 0;
                            (BudgetKind::Assertion, self.prompts.weak_assertion()?)
                        }
                        Evaluation::Executed { failing_tests } => {
                            stats.can_compile = Some(true);
                            failing = failing_tests;
                            info!(failing_tests, attempt, "Generated test fails as required");
                            break LoopOutcome::Success {
                                artifact,
                                failing_tests,
                            };
                        }
                    }
                }
            };

            let used = budget.charge(kind);
            info!(%kind, used, limit = budget.limit(kind), "Retrying test case generation");
            conversation.push_assistant(raw)?;
            conversation.push_user(feedback)?;
        };

        stats.miss_location.get_or_insert(false);
        stats.syntax_fix_times = Some(budget.used(BudgetKind::Syntax));
        stats.compilation_fix_times = Some(budget.used(BudgetKind::Compilation));
        stats.assertion_fix_times = Some(budget.used(BudgetKind::Assertion));
        stats.failing_tests = Some(failing);

        debug!(?stats, "RetryOrchestrator::drive: done");
        Ok(RunReport {
            outcome,
            stats,
            conversation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::llm::client::mock::MockGenerator;
    use crate::validator::mock::ScriptedValidator;

    const GOOD: &str = "```java\n@Test\npublic void testGenerated() {\n    assertEquals(1, Foo.one());\n}\n```";
    const BROKEN: &str = "```java\n@Test\npublic void testGenerated() {\n    int x = ;\n}\n```";
    const COMPILE_LOG: &str = "compile.tests FAIL\n    [javac] FooTest.java:9: error: cannot find symbol\n    [javac]   symbol: method one()\nBUILD FAILED";

    fn target() -> BugTarget {
        BugTarget {
            project_id: "Lang".to_string(),
            bug_id: 1,
            session_id: "test".to_string(),
        }
    }

    fn start() -> Conversation {
        let mut conv = Conversation::new("system");
        conv.push_user("Write a failing test").unwrap();
        conv
    }

    async fn run(generator: &MockGenerator, validator: &ScriptedValidator) -> Result<RunReport, RetryError> {
        let prompts = PromptLoader::embedded_only();
        RetryOrchestrator::new(generator, validator, &prompts)
            .run(&target(), start())
            .await
    }

    #[tokio::test]
    async fn test_syntax_budget_exhausted_after_five() {
        let generator = MockGenerator::new([BROKEN; 6]);
        let validator = ScriptedValidator::empty();

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(generator.call_count(), 5);
        assert_eq!(report.stats.syntax_fix_times, Some(5));
        assert_eq!(report.stats.has_valid_syntax, Some(false));
        assert_eq!(report.stats.can_compile, None);
        assert_eq!(
            report.outcome,
            LoopOutcome::BudgetExhausted {
                budget: BudgetKind::Syntax,
                last_artifact: None,
            }
        );
        // system + prompt + 5 × (assistant, feedback)
        assert_eq!(report.conversation.len(), 12);
        assert!(validator.augmented().is_empty());
    }

    #[tokio::test]
    async fn test_location_miss_stops_immediately() {
        let generator = MockGenerator::new([GOOD, GOOD]);
        let validator = ScriptedValidator::missing_location();

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(generator.call_count(), 1);
        assert_eq!(validator.evaluate_calls(), 0);
        assert_eq!(report.stats.miss_location, Some(true));
        assert_eq!(report.stats.syntax_fix_times, Some(0));
        assert_eq!(report.stats.compilation_fix_times, Some(0));
        assert_eq!(report.stats.assertion_fix_times, Some(0));
        assert!(matches!(report.outcome, LoopOutcome::LocationMiss { .. }));
        assert_eq!(report.conversation.len(), 2);
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let generator = MockGenerator::new([GOOD]);
        let validator = ScriptedValidator::new([Evaluation::Executed { failing_tests: 2 }]);

        let report = run(&generator, &validator).await.unwrap();

        assert!(report.outcome.is_success());
        assert_eq!(report.stats.has_valid_syntax, Some(true));
        assert_eq!(report.stats.can_compile, Some(true));
        assert_eq!(report.stats.failing_tests, Some(2));
        assert_eq!(report.stats.miss_location, Some(false));
        assert_eq!(report.stats.syntax_fix_times, Some(0));
        assert_eq!(report.stats.compilation_fix_times, Some(0));
        assert_eq!(report.stats.assertion_fix_times, Some(0));
        assert_eq!(
            report.outcome.artifact().map(|a| a.test_methods.clone()),
            Some(vec!["testGenerated".to_string()])
        );
    }

    #[tokio::test]
    async fn test_weak_assertion_then_success() {
        let generator = MockGenerator::new([GOOD, GOOD]);
        let validator = ScriptedValidator::new([
            Evaluation::Executed { failing_tests: 0 },
            Evaluation::Executed { failing_tests: 1 },
        ]);

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(report.stats.assertion_fix_times, Some(1));
        assert_eq!(report.stats.failing_tests, Some(1));
        let feedback = &report.conversation.turns()[3];
        assert_eq!(feedback.role, Role::User);
        assert!(feedback.content.contains("throw"));
    }

    #[tokio::test]
    async fn test_compile_failure_sends_digest() {
        let generator = MockGenerator::new([GOOD, GOOD]);
        let validator = ScriptedValidator::new([
            Evaluation::CompileFailure(COMPILE_LOG.to_string()),
            Evaluation::Executed { failing_tests: 1 },
        ]);

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(report.stats.compilation_fix_times, Some(1));
        assert_eq!(report.stats.can_compile, Some(true));
        let feedback = &report.conversation.turns()[3].content;
        assert!(feedback.starts_with("Fix following compilation errors in your test case\n"));
        assert!(feedback.contains("error: cannot find symbol"));
        assert!(feedback.contains("symbol: method one()"));
        assert!(!feedback.contains("BUILD FAILED"));
    }

    #[tokio::test]
    async fn test_compile_failure_without_error_line_uses_generic_message() {
        let generator = MockGenerator::new([GOOD, GOOD]);
        let validator = ScriptedValidator::new([
            Evaluation::CompileFailure("BUILD FAILED".to_string()),
            Evaluation::Executed { failing_tests: 3 },
        ]);

        let report = run(&generator, &validator).await.unwrap();

        let prompts = PromptLoader::embedded_only();
        assert_eq!(report.conversation.turns()[3].content, prompts.compile_error(None).unwrap());
        assert_eq!(report.stats.failing_tests, Some(3));
    }

    #[tokio::test]
    async fn test_compilation_budget_keeps_last_artifact() {
        let generator = MockGenerator::new([GOOD; 5]);
        let validator = ScriptedValidator::new(vec![Evaluation::CompileFailure(COMPILE_LOG.to_string()); 5]);

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(report.stats.compilation_fix_times, Some(5));
        assert_eq!(report.stats.can_compile, Some(false));
        match report.outcome {
            LoopOutcome::BudgetExhausted { budget, last_artifact } => {
                assert_eq!(budget, BudgetKind::Compilation);
                assert!(last_artifact.is_some());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_assertion_budget_exhausted() {
        let generator = MockGenerator::new([GOOD; 6]);
        let validator = ScriptedValidator::new(vec![Evaluation::Executed { failing_tests: 0 }; 6]);

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(generator.call_count(), 5);
        assert_eq!(validator.evaluate_calls(), 5);
        assert_eq!(report.stats.assertion_fix_times, Some(5));
        assert_eq!(report.stats.can_compile, Some(true));
        assert_eq!(report.stats.failing_tests, Some(0));
        match report.outcome {
            LoopOutcome::BudgetExhausted { budget, last_artifact } => {
                assert_eq!(budget, BudgetKind::Assertion);
                assert_eq!(
                    last_artifact.map(|a| a.test_methods),
                    Some(vec!["testGenerated".to_string()])
                );
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_budgets_are_counted_independently() {
        // four failures of each kind stay under every limit
        let mut responses = Vec::new();
        let mut evaluations = Vec::new();
        for _ in 0..4 {
            responses.extend([BROKEN, GOOD, GOOD]);
            evaluations.extend([
                Evaluation::CompileFailure(COMPILE_LOG.to_string()),
                Evaluation::Executed { failing_tests: 0 },
            ]);
        }
        responses.push(GOOD);
        evaluations.push(Evaluation::Executed { failing_tests: 2 });
        let generator = MockGenerator::new(responses);
        let validator = ScriptedValidator::new(evaluations);

        let report = run(&generator, &validator).await.unwrap();

        assert!(report.outcome.is_success(), "outcome was {:?}", report.outcome);
        assert_eq!(generator.call_count(), 13);
        assert_eq!(report.stats.syntax_fix_times, Some(4));
        assert_eq!(report.stats.compilation_fix_times, Some(4));
        assert_eq!(report.stats.assertion_fix_times, Some(4));
        assert_eq!(report.stats.failing_tests, Some(2));
        assert_eq!(report.conversation.len(), 2 + 12 * 2);
    }

    #[tokio::test]
    async fn test_parse_failure_then_success() {
        let generator = MockGenerator::new(["I think the MUT is fine.", GOOD]);
        let validator = ScriptedValidator::new([Evaluation::Executed { failing_tests: 1 }]);

        let report = run(&generator, &validator).await.unwrap();

        assert_eq!(report.stats.syntax_fix_times, Some(1));
        assert_eq!(report.stats.has_valid_syntax, Some(true));
        assert_eq!(
            report.conversation.turns()[3].content,
            "Please generate only 1 test case within a Java code block in Markdown format."
        );
        // the second request saw the corrective turn
        assert_eq!(generator.seen()[1].len(), 4);
    }

    #[tokio::test]
    async fn test_custom_limits() {
        let generator = MockGenerator::new([BROKEN; 3]);
        let validator = ScriptedValidator::empty();
        let prompts = PromptLoader::embedded_only();

        let report = RetryOrchestrator::new(&generator, &validator, &prompts)
            .with_limits(RetryConfig {
                max_syntax_fixes: 2,
                ..RetryConfig::default()
            })
            .run(&target(), start())
            .await
            .unwrap();

        assert_eq!(generator.call_count(), 2);
        assert_eq!(report.stats.syntax_fix_times, Some(2));
    }

    #[tokio::test]
    async fn test_replay_is_deterministic() {
        let script = ["no code", BROKEN, GOOD, GOOD];
        let evaluations = || {
            [
                Evaluation::CompileFailure(COMPILE_LOG.to_string()),
                Evaluation::Executed { failing_tests: 1 },
            ]
        };

        let first = run(&MockGenerator::new(script), &ScriptedValidator::new(evaluations()))
            .await
            .unwrap();
        let second = run(&MockGenerator::new(script), &ScriptedValidator::new(evaluations()))
            .await
            .unwrap();

        assert_eq!(first.stats, second.stats);
        assert_eq!(first.conversation, second.conversation);
        assert_eq!(first.outcome, second.outcome);
        assert_eq!(first.stats.syntax_fix_times, Some(2));
        assert_eq!(first.stats.compilation_fix_times, Some(1));
    }

    #[tokio::test]
    async fn test_generation_error_propagates() {
        let generator = MockGenerator::from_results([Err("connection refused".to_string())]);
        let validator = ScriptedValidator::empty();

        let result = run(&generator, &validator).await;

        assert!(matches!(result, Err(RetryError::Llm(_))));
    }

    #[tokio::test]
    async fn test_validator_error_propagates() {
        let generator = MockGenerator::new([GOOD]);
        // no scripted evaluation left
        let validator = ScriptedValidator::empty();

        let result = run(&generator, &validator).await;

        assert!(matches!(result, Err(RetryError::Validator(_))));
    }

    #[tokio::test]
    async fn test_working_copy_released_after_success() {
        let generator = MockGenerator::new([GOOD]);
        let validator = ScriptedValidator::new([Evaluation::Executed { failing_tests: 1 }]);

        let report = run(&generator, &validator).await.unwrap();

        assert!(report.outcome.is_success());
        assert_eq!(validator.released(), vec!["test".to_string()]);
    }

    #[tokio::test]
    async fn test_working_copy_released_after_error() {
        let generator = MockGenerator::new([GOOD]);
        let validator = ScriptedValidator::empty();

        let result = run(&generator, &validator).await;

        assert!(result.is_err());
        assert_eq!(validator.released(), vec!["test".to_string()]);
    }
}
