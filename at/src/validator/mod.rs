//! Build and test validation of generated test cases
//!
//! A [`BuildValidator`] splices a generated artifact into the test suite of an
//! isolated working copy and reports whether it compiles and how many tests
//! fail. [`Defects4jValidator`] drives the `defects4j` command-line tool.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

mod command;
mod compress;
mod defects4j;

pub use command::{CommandOutput, run_command};
pub use compress::{DEFAULT_LIMIT, DEFAULT_MARKER, DiagnosticCompressor};
pub use defects4j::Defects4jValidator;

use crate::extract::GeneratedArtifact;

/// Bug whose test suite receives the generated test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BugTarget {
    pub project_id: String,
    pub bug_id: u32,
    /// Isolates the working copy of one prompt run
    pub session_id: String,
}

/// A test suite that holds a generated test and can be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteHandle {
    pub work_dir: PathBuf,
    /// Fully qualified class that received the test
    pub test_class: String,
    /// Methods to run, as declared by the artifact
    pub test_methods: Vec<String>,
}

impl SuiteHandle {
    /// `Class::method` selectors for the build tool
    pub fn selectors(&self) -> Vec<String> {
        self.test_methods
            .iter()
            .map(|m| format!("{}::{}", self.test_class, m))
            .collect()
    }
}

/// Result of compiling and running an augmented suite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// The suite did not compile; raw tool output
    CompileFailure(String),
    /// The suite compiled and the generated tests ran
    Executed { failing_tests: u32 },
}

/// Validator errors
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("`{command}` exited with {exit_code}: {output}")]
    ToolFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    #[error("unexpected tool output: {0}")]
    UnexpectedOutput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Splices artifacts into a test suite and evaluates it
#[async_trait]
pub trait BuildValidator: Send + Sync {
    /// Insert `artifact` into the suite of `target`
    ///
    /// Returns `None` when the suite has no place for the test (missing test
    /// file or insertion anchor).
    async fn augment(
        &self,
        target: &BugTarget,
        artifact: &GeneratedArtifact,
    ) -> Result<Option<SuiteHandle>, ValidatorError>;

    /// Compile the suite and run the generated tests
    async fn evaluate(&self, suite: &SuiteHandle) -> Result<Evaluation, ValidatorError>;

    /// Drop the working copy of `target` once its run is over
    async fn release(&self, _target: &BugTarget) -> Result<(), ValidatorError> {
        Ok(())
    }
}

#[cfg(test)]
pub mod mock {
    //! Scripted validator for loop tests

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays scripted augment and evaluate results in order
    ///
    /// When the augment script runs out every further call yields a handle.
    pub struct ScriptedValidator {
        augments: Mutex<VecDeque<bool>>,
        evaluations: Mutex<VecDeque<Evaluation>>,
        augmented: Mutex<Vec<GeneratedArtifact>>,
        evaluate_calls: Mutex<usize>,
        released: Mutex<Vec<String>>,
    }

    impl ScriptedValidator {
        pub fn new(evaluations: impl IntoIterator<Item = Evaluation>) -> Self {
            Self {
                augments: Mutex::new(VecDeque::new()),
                evaluations: Mutex::new(evaluations.into_iter().collect()),
                augmented: Mutex::new(Vec::new()),
                evaluate_calls: Mutex::new(0),
                released: Mutex::new(Vec::new()),
            }
        }

        /// No scripted evaluations; every evaluate call fails
        pub fn empty() -> Self {
            Self::new(Vec::<Evaluation>::new())
        }

        /// First augment call reports a location miss
        pub fn missing_location() -> Self {
            let validator = Self::empty();
            validator.augments.lock().unwrap().push_back(false);
            validator
        }

        pub fn augmented(&self) -> Vec<GeneratedArtifact> {
            self.augmented.lock().unwrap().clone()
        }

        pub fn evaluate_calls(&self) -> usize {
            *self.evaluate_calls.lock().unwrap()
        }

        /// Session ids passed to `release`, in call order
        pub fn released(&self) -> Vec<String> {
            self.released.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BuildValidator for ScriptedValidator {
        async fn augment(
            &self,
            target: &BugTarget,
            artifact: &GeneratedArtifact,
        ) -> Result<Option<SuiteHandle>, ValidatorError> {
            self.augmented.lock().unwrap().push(artifact.clone());
            let found = self.augments.lock().unwrap().pop_front().unwrap_or(true);
            Ok(found.then(|| SuiteHandle {
                work_dir: PathBuf::from(format!("/tmp/{}_{}", target.project_id, target.bug_id)),
                test_class: "org.example.FooTest".to_string(),
                test_methods: artifact.test_methods.clone(),
            }))
        }

        async fn evaluate(&self, _suite: &SuiteHandle) -> Result<Evaluation, ValidatorError> {
            *self.evaluate_calls.lock().unwrap() += 1;
            self.evaluations
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ValidatorError::UnexpectedOutput("No more scripted evaluations".to_string()))
        }

        async fn release(&self, target: &BugTarget) -> Result<(), ValidatorError> {
            self.released.lock().unwrap().push(target.session_id.clone());
            Ok(())
        }
    }
}
