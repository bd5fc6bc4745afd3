//! CLI command definitions

use crate::execution::SchedulingStrategy;
use clap::Args;
use std::path::PathBuf;

/// The event to evaluate the workflow against
#[derive(Debug, Args, Clone)]
pub struct EventArgs {
    /// Event name (push, pull_request, workflow_dispatch, ...)
    #[arg(long, env = "CIRUN_EVENT", default_value = "push")]
    pub event: String,

    /// Pushed branch, or the target branch of a pull request
    #[arg(long, env = "CIRUN_BRANCH")]
    pub branch: String,

    /// Only run these jobs (and the jobs they need)
    #[arg(long)]
    pub job: Vec<String>,
}

/// Run a workflow
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub event: EventArgs,

    /// Secret value (NAME=VALUE)
    #[arg(long, value_parser = parse_key_value)]
    pub secret: Vec<(String, String)>,

    /// Secret read from the environment variable of the same name
    #[arg(long)]
    pub secret_env: Vec<String>,

    /// File of NAME=VALUE secret lines
    #[arg(long)]
    pub secrets_file: Option<PathBuf>,

    /// Scheduling strategy; jobs still wait for their `needs` and matrix
    /// instances for their `max-parallel` limit
    #[arg(long, value_enum, default_value_t = SchedulingStrategyArg::Parallel)]
    pub strategy: SchedulingStrategyArg,

    /// Concurrent job limit for `parallel-limited`
    #[arg(long, default_value_t = 4)]
    pub max_jobs: usize,

    /// Runner configuration file (action aliases, default shell, ...)
    #[arg(long)]
    pub runner_config: Option<PathBuf>,

    /// Directory the steps run in (defaults to the current directory)
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl RunCommand {
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        match self.strategy {
            SchedulingStrategyArg::Sequential => SchedulingStrategy::Sequential,
            SchedulingStrategyArg::Parallel => SchedulingStrategy::Parallel,
            SchedulingStrategyArg::ParallelLimited => SchedulingStrategy::LimitedParallel(self.max_jobs),
        }
    }
}

/// Validate a workflow file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show the run plan for an event
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to workflow YAML file
    #[arg(short, long)]
    pub file: String,

    #[command(flatten)]
    pub event: EventArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List workflows in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show run counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Workflow name to filter by
    #[arg(short, long)]
    pub workflow: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}

/// Scheduling strategy argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchedulingStrategyArg {
    Sequential,
    Parallel,
    #[clap(name = "parallel-limited")]
    ParallelLimited,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid NAME=VALUE pair: {}", s)),
    }
}
