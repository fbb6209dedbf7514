//! Defects4J-backed validator
//!
//! Each session gets its own checkout under the configured work directory. The
//! bug's trigger test class receives the generated test; the pristine class is
//! kept next to it so every augment starts from the original file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::fs;
use tracing::{debug, info, warn};

use super::command::{CommandOutput, run_command};
use super::{BugTarget, BuildValidator, Evaluation, SuiteHandle, ValidatorError};
use crate::config::ValidatorConfig;
use crate::extract::GeneratedArtifact;

/// Suffix of the untouched copy of an augmented test file
const BACKUP_SUFFIX: &str = "autotester.orig";

static FAILING_TESTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Failing tests:\s*(\d+)").expect("valid failing-tests regex"));

/// Drives the `defects4j` CLI
#[derive(Debug, Clone)]
pub struct Defects4jValidator {
    program: String,
    work_root: PathBuf,
    version_suffix: String,
    timeout: Duration,
    keep_checkouts: bool,
}

impl Defects4jValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        debug!(?config, "Defects4jValidator::new: called");
        Self {
            program: config.defects4j.to_string_lossy().to_string(),
            work_root: config.work_dir.clone(),
            version_suffix: config.version_suffix.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            keep_checkouts: config.keep_checkouts,
        }
    }

    fn checkout_dir(&self, target: &BugTarget) -> PathBuf {
        self.work_root
            .join(format!("{}_{}_{}", target.project_id, target.bug_id, target.session_id))
    }

    async fn d4j(&self, args: &[&str], cwd: &Path) -> Result<CommandOutput, ValidatorError> {
        run_command(&self.program, args, cwd, self.timeout).await
    }

    /// Run a subcommand that must succeed
    async fn d4j_ok(&self, args: &[&str], cwd: &Path) -> Result<CommandOutput, ValidatorError> {
        let output = self.d4j(args, cwd).await?;
        if !output.success() {
            return Err(ValidatorError::ToolFailed {
                command: format!("{} {}", self.program, args.join(" ")),
                exit_code: output.exit_code,
                output: output.combined(),
            });
        }
        Ok(output)
    }

    async fn ensure_checkout(&self, target: &BugTarget) -> Result<PathBuf, ValidatorError> {
        let dir = self.checkout_dir(target);
        if fs::try_exists(&dir).await? {
            debug!(?dir, "ensure_checkout: reusing checkout");
            return Ok(dir);
        }

        fs::create_dir_all(&self.work_root).await?;
        let version = format!("{}{}", target.bug_id, self.version_suffix);
        let dir_arg = dir.to_string_lossy().to_string();
        info!(project = %target.project_id, %version, ?dir, "Checking out bug");
        self.d4j_ok(
            &["checkout", "-p", &target.project_id, "-v", &version, "-w", &dir_arg],
            &self.work_root,
        )
        .await?;
        Ok(dir)
    }

    async fn export(&self, property: &str, dir: &Path) -> Result<String, ValidatorError> {
        let output = self.d4j_ok(&["export", "-p", property], dir).await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl BuildValidator for Defects4jValidator {
    async fn augment(
        &self,
        target: &BugTarget,
        artifact: &GeneratedArtifact,
    ) -> Result<Option<SuiteHandle>, ValidatorError> {
        debug!(?target, methods = ?artifact.test_methods, "augment: called");
        let dir = self.ensure_checkout(target).await?;

        let triggers = self.export("tests.trigger", &dir).await?;
        let Some((test_class, anchor)) = parse_trigger_test(&triggers) else {
            warn!(project = %target.project_id, bug = target.bug_id, "augment: bug has no trigger test");
            return Ok(None);
        };

        let tests_dir = self.export("dir.src.tests", &dir).await?;
        let test_file = test_file_path(&dir, tests_dir.trim(), &test_class);
        if !fs::try_exists(&test_file).await? {
            warn!(?test_file, "augment: trigger test file not found");
            return Ok(None);
        }

        let original = restore_original(&test_file).await?;
        if !has_anchor(&original, &anchor) {
            warn!(%anchor, ?test_file, "augment: anchor method not found");
            return Ok(None);
        }

        let Some(augmented) = insert_before_closing_brace(&original, &artifact.insertable) else {
            warn!(?test_file, "augment: test class has no closing brace");
            return Ok(None);
        };
        fs::write(&test_file, augmented).await?;
        debug!(?test_file, %test_class, "augment: test inserted");

        Ok(Some(SuiteHandle {
            work_dir: dir,
            test_class,
            test_methods: artifact.test_methods.clone(),
        }))
    }

    async fn evaluate(&self, suite: &SuiteHandle) -> Result<Evaluation, ValidatorError> {
        debug!(?suite.work_dir, selectors = ?suite.selectors(), "evaluate: called");
        let compile = self.d4j(&["compile"], &suite.work_dir).await?;
        if !compile.success() {
            info!(exit_code = compile.exit_code, "evaluate: compilation failed");
            return Ok(Evaluation::CompileFailure(compile.combined()));
        }

        let mut failing_tests = 0;
        for selector in suite.selectors() {
            let output = self.d4j(&["test", "-t", &selector], &suite.work_dir).await?;
            let combined = output.combined();
            match parse_failing_tests(&combined) {
                Some(count) => failing_tests += count,
                None => {
                    return Err(ValidatorError::ToolFailed {
                        command: format!("{} test -t {}", self.program, selector),
                        exit_code: output.exit_code,
                        output: combined,
                    });
                }
            }
        }

        info!(failing_tests, "evaluate: tests executed");
        Ok(Evaluation::Executed { failing_tests })
    }

    async fn release(&self, target: &BugTarget) -> Result<(), ValidatorError> {
        let dir = self.checkout_dir(target);
        debug!(?dir, keep = self.keep_checkouts, "release: called");
        if self.keep_checkouts || !fs::try_exists(&dir).await? {
            return Ok(());
        }
        fs::remove_dir_all(&dir).await?;
        info!(?dir, "Removed checkout");
        Ok(())
    }
}

/// First `Class::method` line of a `tests.trigger` export
fn parse_trigger_test(export: &str) -> Option<(String, String)> {
    export
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .find_map(|line| line.split_once("::"))
        .map(|(class, method)| (class.to_string(), method.to_string()))
}

/// Source file of a fully qualified (possibly nested) test class
fn test_file_path(checkout: &Path, tests_dir: &str, class: &str) -> PathBuf {
    let top_level = class.split('$').next().unwrap_or(class);
    let mut path = checkout.join(tests_dir);
    for part in top_level.split('.') {
        path.push(part);
    }
    path.set_extension("java");
    path
}

fn has_anchor(source: &str, method: &str) -> bool {
    let pattern = format!(r"\b{}\s*\(", regex::escape(method));
    Regex::new(&pattern).map(|re| re.is_match(source)).unwrap_or(false)
}

/// Insert `members` before the final `}` of a class file
fn insert_before_closing_brace(source: &str, members: &str) -> Option<String> {
    let idx = source.rfind('}')?;
    let mut out = String::with_capacity(source.len() + members.len() + 4);
    out.push_str(source[..idx].trim_end());
    out.push_str("\n\n");
    out.push_str(members);
    out.push_str("\n}");
    out.push_str(&source[idx + 1..]);
    Some(out)
}

fn parse_failing_tests(output: &str) -> Option<u32> {
    FAILING_TESTS
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn backup_path(test_file: &Path) -> PathBuf {
    let mut name = test_file.as_os_str().to_os_string();
    name.push(".");
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Original content of `test_file`, restoring it from the backup if present
async fn restore_original(test_file: &Path) -> Result<String, ValidatorError> {
    let backup = backup_path(test_file);
    if fs::try_exists(&backup).await? {
        let original = fs::read_to_string(&backup).await?;
        fs::write(test_file, &original).await?;
        debug!(?backup, "restore_original: restored from backup");
        Ok(original)
    } else {
        let original = fs::read_to_string(test_file).await?;
        fs::write(&backup, &original).await?;
        debug!(?backup, "restore_original: backup created");
        Ok(original)
    }
}
