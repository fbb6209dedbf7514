//! Experiment runs over a prompt dataset

mod discovery;
mod driver;
mod folder;

pub use discovery::{
    DEFAULT_QUERIES, DEFECTS4AT_PROJECTS, Dataset, DiscoveryError, PromptFile, ScenarioKind, discover, prompt_dir,
};
pub use driver::{
    DriverSettings, ExperimentDriver, ExperimentSummary, PromptOutcome, RunArguments, answer_schema, load_few_shots,
};
pub use folder::ExperimentFolder;
