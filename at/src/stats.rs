//! Per-prompt statistics and their CSV persistence

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Column order of the statistics file
pub const CSV_HEADER: [&str; 12] = [
    "project_id",
    "bug_id",
    "miss_location",
    "#syntax_fix_times",
    "has_valid_syntax",
    "#compilation_fix_times",
    "can_compile",
    "#assertion_fix_times",
    "#failing_tests",
    "elapsed_nanoseconds",
    "#characters",
    "#tokens",
];

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to write statistics to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome counters for one prompt
///
/// Every field but the identifiers starts unset and is filled as the run
/// observes it; unset fields are written as empty cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptStatistics {
    pub project_id: String,
    pub bug_id: u32,
    pub miss_location: Option<bool>,
    pub syntax_fix_times: Option<u32>,
    pub has_valid_syntax: Option<bool>,
    pub compilation_fix_times: Option<u32>,
    pub can_compile: Option<bool>,
    pub assertion_fix_times: Option<u32>,
    pub failing_tests: Option<u32>,
    pub elapsed_nanoseconds: Option<u64>,
    pub characters: Option<u64>,
    pub tokens: Option<u64>,
}

impl PromptStatistics {
    pub fn new(project_id: impl Into<String>, bug_id: u32) -> Self {
        Self {
            project_id: project_id.into(),
            bug_id,
            ..Self::default()
        }
    }

    /// Cells in [`CSV_HEADER`] order
    pub fn csv_fields(&self) -> Vec<String> {
        vec![
            self.project_id.clone(),
            self.bug_id.to_string(),
            cell(self.miss_location),
            cell(self.syntax_fix_times),
            cell(self.has_valid_syntax),
            cell(self.compilation_fix_times),
            cell(self.can_compile),
            cell(self.assertion_fix_times),
            cell(self.failing_tests),
            cell(self.elapsed_nanoseconds),
            cell(self.characters),
            cell(self.tokens),
        ]
    }

    pub fn to_csv_row(&self) -> String {
        self.csv_fields().iter().map(|f| escape(f)).collect::<Vec<_>>().join(",")
    }
}

fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Sum of the lengths of whitespace-separated words
pub fn count_characters(text: &str) -> u64 {
    text.split_whitespace().map(|w| w.chars().count() as u64).sum()
}

/// Sink for per-prompt statistics
pub trait StatisticsRecorder {
    fn record(&mut self, stats: &PromptStatistics) -> Result<(), StatsError>;
}

/// Appends one CSV row per prompt
#[derive(Debug)]
pub struct CsvRecorder {
    path: PathBuf,
    file: File,
}

impl CsvRecorder {
    /// Create (or truncate) the file and write the header
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "CsvRecorder::create: called");
        let io_err = |source| StatsError::Io {
            path: path.clone(),
            source,
        };

        let mut file = File::create(&path).map_err(io_err)?;
        writeln!(file, "{}", CSV_HEADER.join(",")).map_err(io_err)?;
        let file = OpenOptions::new().append(true).open(&path).map_err(io_err)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatisticsRecorder for CsvRecorder {
    fn record(&mut self, stats: &PromptStatistics) -> Result<(), StatsError> {
        debug!(project = %stats.project_id, bug = stats.bug_id, "CsvRecorder::record: called");
        writeln!(self.file, "{}", stats.to_csv_row())
            .and_then(|_| self.file.flush())
            .map_err(|source| StatsError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
