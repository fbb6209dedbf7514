//! Prompt dataset discovery
//!
//! Prompt files live in `<root>/v<version>/<queries joined>/` and are named
//! `prompt_<scenario>_<bug>_<project>_v<version>.txt`.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Projects collected for the Defects4AT dataset
pub const DEFECTS4AT_PROJECTS: [&str; 4] = ["spring-boot", "shardingsphere", "dolphinscheduler", "micrometer"];

/// Queries asked when none are selected
pub const DEFAULT_QUERIES: [&str; 5] = ["Q1", "Q2", "Q3", "Q4", "Q5"];

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("prompt directory {0} does not exist")]
    MissingDir(PathBuf),

    #[error("failed to list {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid prompt file pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Testing scenario a prompt describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Buggy,
    Fixed,
    Similar,
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Buggy => "buggy",
            Self::Fixed => "fixed",
            Self::Similar => "similar",
        }
    }

    /// What a test for this scenario is expected to do
    pub fn description(&self) -> &'static str {
        match self {
            Self::Buggy => "trigger a bug",
            Self::Fixed => "does not trigger a bug but is useful for regression testing",
            Self::Similar => "similar to MUT TESTS and does not trigger a bug",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Bug dataset the prompts were built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Dataset {
    #[value(name = "defects4j")]
    #[serde(rename = "Defects4J")]
    Defects4J,

    #[value(name = "defects4at")]
    #[serde(rename = "Defects4AT")]
    Defects4AT,
}

impl Dataset {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Defects4J => "Defects4J",
            Self::Defects4AT => "Defects4AT",
        }
    }

    /// Whether prompts of `project` belong to this dataset
    ///
    /// Defects4AT keeps the listed projects; Defects4J is everything else.
    pub fn includes(&self, project: &str, projects: &[String]) -> bool {
        let listed = projects.iter().any(|p| p == project);
        match self {
            Self::Defects4AT => listed,
            Self::Defects4J => !listed,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A discovered prompt file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFile {
    pub path: PathBuf,
    pub scenario: ScenarioKind,
    pub bug_id: u32,
    pub project_id: String,
    pub version: u32,
}

impl PromptFile {
    /// File name without the `.txt` extension
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn result_name(&self) -> String {
        format!("{}_result.txt", self.stem())
    }

    pub fn testcase_name(&self) -> String {
        format!("{}_testcase.txt", self.stem())
    }
}

/// Directory holding the prompts of one template version and query selection
pub fn prompt_dir(root: &Path, version: u32, queries: &[String]) -> PathBuf {
    root.join(format!("v{}", version)).join(queries.concat())
}

fn filename_pattern(scenario: ScenarioKind, version: u32) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"^prompt_{}_(\d+)_([-A-Za-z]+)_v{}\.txt$", scenario.name(), version))
}

/// Find the prompts of `scenario` in `dataset`, sorted by file name
pub fn discover(
    root: &Path,
    dataset: Dataset,
    scenario: ScenarioKind,
    version: u32,
    projects: &[String],
    queries: &[String],
) -> Result<Vec<PromptFile>, DiscoveryError> {
    let dir = prompt_dir(root, version, queries);
    debug!(?dir, %dataset, %scenario, version, "discover: called");
    if !dir.is_dir() {
        return Err(DiscoveryError::MissingDir(dir));
    }

    let pattern = filename_pattern(scenario, version)?;
    let mut prompts = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| DiscoveryError::Walk {
            path: dir.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(caps) = pattern.captures(&name) else {
            continue;
        };
        let Ok(bug_id) = caps[1].parse::<u32>() else {
            debug!(%name, "discover: bug id out of range");
            continue;
        };
        let project_id = caps[2].to_string();
        if !dataset.includes(&project_id, projects) {
            continue;
        }
        prompts.push(PromptFile {
            path: entry.path().to_path_buf(),
            scenario,
            bug_id,
            project_id,
            version,
        });
    }

    debug!(count = prompts.len(), "discover: done");
    Ok(prompts)
}
