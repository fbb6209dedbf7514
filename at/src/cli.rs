//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;

use crate::config::ResponseFormat;
use crate::experiment::{DEFAULT_QUERIES, DEFECTS4AT_PROJECTS, Dataset, ScenarioKind};

/// AutoTester - LLM test generation with build feedback
#[derive(Parser)]
#[command(
    name = "at",
    about = "Prompt LLMs with testing scenarios and validate the tests they generate",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prompt a model with scenario questions and generate test cases
    Prompt(PromptArgs),

    /// List the configured model table
    Models,
}

#[derive(Debug, Clone, clap::Args)]
pub struct PromptArgs {
    /// Model id from the model table (defaults to `llm.default`)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Testing scenario to prompt
    #[arg(short, long, value_enum)]
    pub scenario: ScenarioKind,

    /// Prompt template version
    #[arg(short, long)]
    pub version: u32,

    /// Target defect dataset
    #[arg(short, long, value_enum)]
    pub dataset: Dataset,

    /// Projects separated by space
    #[arg(short, long, num_args = 1.., default_values_t = DEFECTS4AT_PROJECTS.map(String::from))]
    pub projects: Vec<String>,

    /// Selection of queries
    #[arg(short, long, num_args = 1.., default_values_t = DEFAULT_QUERIES.map(String::from))]
    pub queries: Vec<String>,

    /// Sampling temperature (higher is more creative, lower is more coherent)
    #[arg(short, long)]
    pub temperature: Option<f32>,

    /// Sampling seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// JSON file with few-shot turns (`[{"role": ..., "content": ...}]`)
    #[arg(long, value_name = "FILE")]
    pub few_shots: Option<PathBuf>,

    /// Output format of scenario answers
    #[arg(short, long, value_enum)]
    pub format: Option<ResponseFormat>,

    /// Only ask the scenario questions, skip test case generation
    #[arg(long)]
    pub no_tcg: bool,
}

/// Log file written by `at`
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autotester")
        .join("logs")
        .join("autotester.log")
}

/// First executable named `name` on `PATH`
fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Help footer with tool availability and the log location
pub fn generate_after_help(defects4j: &str) -> String {
    debug!(%defects4j, "generate_after_help: called");
    let found = if defects4j.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(defects4j);
        path.is_file().then_some(path)
    } else {
        find_on_path(defects4j)
    };

    let mut help = String::from("Required Tools:\n");
    match found {
        Some(path) => help.push_str(&format!("  \u{2705} {:<10} {}\n", "defects4j", path.display())),
        None => help.push_str(&format!("  \u{274C} {:<10} not found\n", "defects4j")),
    }
    help.push('\n');
    help.push_str(&format!("Logs are written to: {}\n", get_log_path().display()));
    help
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_prompt_defaults() {
        let cli = Cli::try_parse_from(["at", "prompt", "-s", "buggy", "-v", "4", "-d", "defects4j"]).unwrap();
        let Command::Prompt(args) = cli.command else {
            panic!("expected prompt command");
        };
        assert_eq!(args.scenario, ScenarioKind::Buggy);
        assert_eq!(args.dataset, Dataset::Defects4J);
        assert_eq!(args.projects, DEFECTS4AT_PROJECTS.map(String::from).to_vec());
        assert_eq!(args.queries.len(), 5);
        assert!(args.model.is_none());
        assert!(!args.no_tcg);
    }

    #[test]
    fn test_prompt_full() {
        let cli = Cli::try_parse_from([
            "at", "-l", "debug", "prompt", "-m", "gpt4o", "-s", "similar", "-v", "0", "-d", "defects4at", "-p",
            "micrometer", "-q", "Q1", "Q3", "-t", "0.2", "--seed", "7", "--format", "jsonline", "--no-tcg",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Prompt(args) = cli.command else {
            panic!("expected prompt command");
        };
        assert_eq!(args.model.as_deref(), Some("gpt4o"));
        assert_eq!(args.projects, vec!["micrometer".to_string()]);
        assert_eq!(args.queries, vec!["Q1".to_string(), "Q3".to_string()]);
        assert_eq!(args.temperature, Some(0.2));
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.format, Some(ResponseFormat::Jsonline));
        assert!(args.no_tcg);
    }

    #[test]
    fn test_after_help_mentions_tool_and_logs() {
        let help = generate_after_help("autotester-no-such-tool");
        assert!(help.contains("defects4j"));
        assert!(help.contains("not found"));
        assert!(help.contains("autotester.log"));
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        assert!(Cli::try_parse_from(["at", "prompt", "-s", "weird", "-v", "4", "-d", "defects4j"]).is_err());
    }
}
