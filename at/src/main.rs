//! AutoTester - LLM test generation with build feedback
//!
//! CLI entry point for prompting experiments.

use std::fs;

use clap::{CommandFactory, FromArgMatches};
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use autotester::cli::{Cli, Command, PromptArgs, generate_after_help, get_log_path};
use autotester::config::{Config, ValidatorConfig};
use autotester::experiment::{
    DriverSettings, ExperimentDriver, ExperimentFolder, RunArguments, discover, load_few_shots,
};
use autotester::llm::{GenerationOptions, create_generator};
use autotester::prompts::PromptLoader;
use autotester::stats::CsvRecorder;
use autotester::validator::{DiagnosticCompressor, Defects4jValidator};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Logging isn't initialized yet, so nothing here can be traced
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > INFO
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let defects4j = ValidatorConfig::default().defects4j.to_string_lossy().to_string();
    let cmd = Cli::command().after_help(generate_after_help(&defects4j));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("AutoTester loaded config: default={}", config.llm.default);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Prompt(args) => {
            debug!(scenario = %args.scenario, dataset = %args.dataset, "main: matched Prompt command");
            cmd_prompt(&config, args).await
        }
        Command::Models => {
            debug!("main: matched Models command");
            cmd_models(&config)
        }
    }
}

/// Print the model table
fn cmd_models(config: &Config) -> Result<()> {
    debug!("cmd_models: called");
    println!("{}", "Models:".bold());
    for (id, spec) in &config.llm.models {
        let marker = if *id == config.llm.default {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "  {} {:<18} {:<8} {:<7} {}",
            marker,
            id.cyan(),
            spec.provider,
            spec.context_limit,
            spec.description.dimmed()
        );
    }
    Ok(())
}

/// Run one prompting experiment
async fn cmd_prompt(config: &Config, args: PromptArgs) -> Result<()> {
    debug!(?args, "cmd_prompt: called");
    config.validate(args.model.as_deref())?;
    let model = config.llm.resolve(args.model.as_deref())?;

    let generator = create_generator(&model).context(format!("Failed to create backend for {}", model.id))?;
    let validator = Defects4jValidator::new(&config.validator);
    let prompt_loader = PromptLoader::new(".");

    let mut options = GenerationOptions::from_config(&config.generation);
    if let Some(temperature) = args.temperature {
        options.temperature = temperature;
    }
    if args.seed.is_some() {
        options.seed = args.seed;
    }

    let prompts = discover(
        &config.experiment.prompts_dir,
        args.dataset,
        args.scenario,
        args.version,
        &args.projects,
        &args.queries,
    )?;
    println!(
        "Found {} {} prompts for {} ({})",
        prompts.len(),
        args.scenario,
        args.dataset,
        args.scenario.description()
    );

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let folder = ExperimentFolder::create(
        &config.experiment.results_dir,
        &timestamp,
        &model.id,
        args.dataset,
        args.scenario,
    )?;

    let response_format = args.format.unwrap_or(config.experiment.response_format);
    let test_generation = config.experiment.test_generation && !args.no_tcg;
    folder.write_arguments(&RunArguments {
        model: model.id.clone(),
        backend_model: model.model.clone(),
        scenario: args.scenario,
        dataset: args.dataset,
        version: args.version,
        projects: args.projects.clone(),
        queries: args.queries.clone(),
        temperature: options.temperature,
        seed: options.seed,
        few_shots: args.few_shots.clone(),
        format: response_format,
        test_generation,
    })?;

    let mut recorder = CsvRecorder::create(folder.statistics_path())?;

    let settings = DriverSettings {
        context_limit: model.context_limit,
        queries: args.queries.clone(),
        options,
        retry: config.retry,
        compressor: DiagnosticCompressor::new(config.validator.marker.clone(), config.validator.digest_limit),
        response_format,
        test_generation,
    };

    let few_shots = match &args.few_shots {
        Some(path) => load_few_shots(path)?,
        None => Vec::new(),
    };

    let driver = ExperimentDriver::new(generator.as_ref(), &validator, &prompt_loader, settings).with_few_shots(few_shots);
    let summary = driver.run_all(&prompts, &folder, &mut recorder).await?;

    println!(
        "{} completed, {} skipped, {} aborted, {} with a passing test",
        summary.completed.to_string().green(),
        summary.skipped.to_string().yellow(),
        summary.aborted.to_string().red(),
        summary.succeeded
    );
    println!("Results: {}", folder.path().display());
    Ok(())
}
