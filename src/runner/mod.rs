//! Command runners - how steps reach the outside world

pub mod actions;
pub mod config;
pub mod response;
pub mod shell;
pub mod subprocess;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use actions::{ActionHandler, ActionRegistry, BuiltinAction};
pub use config::{ActionAliasConfig, RunnerConfig};
pub use response::{CommandOutput, OutputStream, RunnerError};
pub use shell::{ShellTemplate, DEFAULT_SHELL};
pub use subprocess::SubprocessRunner;

/// A fully resolved process invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,

    pub args: Vec<String>,

    /// Extra environment for the process (inherits the runner's environment)
    pub env: BTreeMap<String, String>,

    pub working_dir: PathBuf,

    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: working_dir.into(),
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Command line for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Receives output lines as they are produced
pub trait OutputSink: Send + Sync {
    fn on_line(&self, stream: OutputStream, line: &str);
}

/// Trait for command execution - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion.
    ///
    /// A non-zero exit is reported through `CommandOutput::exit_code`, not
    /// as an error; errors mean the command could not run to completion.
    async fn run(
        &self,
        command: &CommandSpec,
        sink: Option<&dyn OutputSink>,
    ) -> Result<CommandOutput, RunnerError>;
}
