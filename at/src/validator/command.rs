//! Subprocess execution for build tool commands

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::debug;

use super::ValidatorError;

/// Captured result of a tool invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr; javac diagnostics may land on either
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Run `program args..` in `cwd`, killing it after `timeout`
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, ValidatorError> {
    debug!(%program, ?args, ?cwd, timeout_ms = timeout.as_millis() as u64, "run_command: called");
    let start = Instant::now();
    let rendered = format!("{} {}", program, args.join(" "));

    let output = tokio::time::timeout(
        timeout,
        tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match output {
        Ok(Ok(output)) => {
            let duration_ms = start.elapsed().as_millis() as u64;
            let exit_code = output.status.code().unwrap_or(-1);
            debug!(exit_code, duration_ms, "run_command: command completed");
            Ok(CommandOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                duration_ms,
            })
        }
        Ok(Err(e)) => {
            debug!(error = %e, "run_command: spawn failed");
            Err(ValidatorError::Spawn {
                command: rendered,
                source: e,
            })
        }
        Err(_) => {
            debug!("run_command: command timed out");
            Err(ValidatorError::Timeout {
                command: rendered,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_command_success() {
        let temp = tempdir().unwrap();
        let result = run_command("sh", &["-c", "echo ok"], temp.path(), Duration::from_secs(30))
            .await
            .unwrap();

        assert!(result.success());
        assert!(result.stdout.contains("ok"));
    }

    #[tokio::test]
    async fn test_command_failure_keeps_output() {
        let temp = tempdir().unwrap();
        let result = run_command("sh", &["-c", "echo out; echo err >&2; exit 3"], temp.path(), Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert_eq!(result.combined(), "out\n\nerr\n");
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let temp = tempdir().unwrap();
        let result = run_command("sleep", &["10"], temp.path(), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ValidatorError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let temp = tempdir().unwrap();
        let result = run_command("autotester-no-such-tool", &[], temp.path(), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(ValidatorError::Spawn { .. })));
    }
}
