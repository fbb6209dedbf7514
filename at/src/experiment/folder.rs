//! Experiment result folder

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::Serialize;
use tracing::debug;

use super::discovery::{Dataset, ScenarioKind};

pub const LOG_FILE: &str = "prompt.log";
pub const STATS_FILE: &str = "statistics.csv";
pub const RESULTS_FILE: &str = "results.jsonl";
pub const ARGUMENTS_FILE: &str = "arguments.json";

#[derive(Serialize)]
struct JsonlRecord<'a> {
    project: &'a str,
    bug: u32,
    response: &'a str,
}

/// `<results-dir>/<timestamp>_<model>_<dataset>_<scenario>/`
#[derive(Debug, Clone)]
pub struct ExperimentFolder {
    path: PathBuf,
}

impl ExperimentFolder {
    pub fn folder_name(timestamp: &str, model_id: &str, dataset: Dataset, scenario: ScenarioKind) -> String {
        format!("{}_{}_{}_{}", timestamp, model_id, dataset, scenario)
    }

    pub fn create(
        results_dir: &Path,
        timestamp: &str,
        model_id: &str,
        dataset: Dataset,
        scenario: ScenarioKind,
    ) -> Result<Self> {
        let path = results_dir.join(Self::folder_name(timestamp, model_id, dataset, scenario));
        debug!(?path, "ExperimentFolder::create: called");
        fs::create_dir_all(&path).context(format!("Failed to create experiment folder {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn statistics_path(&self) -> PathBuf {
        self.path.join(STATS_FILE)
    }

    /// Save the run arguments as pretty JSON
    pub fn write_arguments<T: Serialize>(&self, arguments: &T) -> Result<()> {
        let path = self.path.join(ARGUMENTS_FILE);
        let json = serde_json::to_string_pretty(arguments).context("Failed to serialize arguments")?;
        fs::write(&path, json).context(format!("Failed to write {}", path.display()))
    }

    /// Append a line to `prompt.log`
    pub fn log_note(&self, note: &str) -> Result<()> {
        debug!(%note, "ExperimentFolder::log_note: called");
        let path = self.path.join(LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open {}", path.display()))?;
        writeln!(file, "{}", note).context("Failed to append to prompt log")
    }

    /// Write a whole file inside the folder
    pub fn write_file(&self, name: &str, content: &str) -> Result<()> {
        let path = self.path.join(name);
        fs::write(&path, content).context(format!("Failed to write {}", path.display()))
    }

    /// Append one `{project, bug, response}` record to `results.jsonl`
    pub fn append_result(&self, project: &str, bug: u32, response: &str) -> Result<()> {
        let path = self.path.join(RESULTS_FILE);
        let line = serde_json::to_string(&JsonlRecord { project, bug, response })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open {}", path.display()))?;
        writeln!(file, "{}", line).context("Failed to append result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_folder_name() {
        assert_eq!(
            ExperimentFolder::folder_name("20250101_120000", "llama3.1-8b", Dataset::Defects4J, ScenarioKind::Buggy),
            "20250101_120000_llama3.1-8b_Defects4J_buggy"
        );
    }

    #[test]
    fn test_files_written() {
        let temp = tempdir().unwrap();
        let folder = ExperimentFolder::create(
            temp.path(),
            "20250101_120000",
            "gpt4o",
            Dataset::Defects4AT,
            ScenarioKind::Fixed,
        )
        .unwrap();

        folder.write_arguments(&serde_json::json!({"model": "gpt-4o", "seed": 1})).unwrap();
        folder.log_note("Ignore a.txt due to context limit!").unwrap();
        folder.log_note("second").unwrap();
        folder.append_result("micrometer", 7, "{\"Q1\": \"Yes\"}").unwrap();
        folder.write_file("x_result.txt", "answer").unwrap();

        let args: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(folder.path().join(ARGUMENTS_FILE)).unwrap()).unwrap();
        assert_eq!(args["seed"], 1);
        let log = fs::read_to_string(folder.path().join(LOG_FILE)).unwrap();
        assert_eq!(log, "Ignore a.txt due to context limit!\nsecond\n");
        let jsonl = fs::read_to_string(folder.path().join(RESULTS_FILE)).unwrap();
        let record: serde_json::Value = serde_json::from_str(jsonl.trim()).unwrap();
        assert_eq!(record["project"], "micrometer");
        assert_eq!(record["bug"], 7);
        assert_eq!(fs::read_to_string(folder.path().join("x_result.txt")).unwrap(), "answer");
        assert!(folder.statistics_path().ends_with(STATS_FILE));
    }
}
