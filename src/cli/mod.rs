//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Local runner for CI workflows
#[derive(Debug, Parser, Clone)]
#[command(name = "cirun")]
#[command(version)]
#[command(about = "Run CI workflows locally: triggers, job matrices and fail-fast steps", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Stream step output as it is produced
    #[arg(short, long, global = true)]
    pub stream: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow for an event
    Run(RunCommand),

    /// Validate a workflow file
    Validate(ValidateCommand),

    /// Show the jobs an event would run, without running them
    Plan(PlanCommand),

    /// List workflows in history
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
