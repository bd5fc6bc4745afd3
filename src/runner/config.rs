//! Runner configuration - local settings that are not part of a workflow

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default job timeout when a workflow declares none (6 hours)
pub const DEFAULT_JOB_TIMEOUT_MINUTES: u64 = 360;

/// A local stand-in for a reusable action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAliasConfig {
    /// Script to run; step inputs are exposed as `INPUT_<NAME>`
    pub run: String,

    /// Shell template (defaults to the runner's default shell)
    #[serde(default)]
    pub shell: Option<String>,
}

/// Configuration for the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    /// Shell template for `run` steps without `shell:`
    #[serde(default = "default_shell")]
    pub default_shell: String,

    /// Job timeout in minutes when the workflow declares none
    #[serde(default = "default_job_timeout")]
    pub default_timeout_minutes: u64,

    /// Upper bound on concurrently running jobs across the whole run
    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,

    /// Repository directory steps run in (defaults to the current directory)
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// Action aliases keyed by `owner/repo` or `owner/repo@ref`
    #[serde(default)]
    pub actions: BTreeMap<String, ActionAliasConfig>,
}

fn default_shell() -> String {
    crate::runner::DEFAULT_SHELL.to_string()
}

fn default_job_timeout() -> u64 {
    DEFAULT_JOB_TIMEOUT_MINUTES
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_shell: default_shell(),
            default_timeout_minutes: DEFAULT_JOB_TIMEOUT_MINUTES,
            max_concurrent_jobs: None,
            workspace: None,
            actions: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load runner configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runner config {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid runner config {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// `<config dir>/cirun/runner.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cirun").join("runner.yaml"))
    }

    /// Load from the given path, else from the default path if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(default) if default.exists() => Self::from_file(default),
            _ => Ok(Self::default()),
        }
    }

    pub fn with_default_shell(mut self, shell: impl Into<String>) -> Self {
        self.default_shell = shell.into();
        self
    }

    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = Some(max);
        self
    }

    pub fn with_action(mut self, reference: impl Into<String>, alias: ActionAliasConfig) -> Self {
        self.actions.insert(reference.into(), alias);
        self
    }

    pub fn default_job_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_minutes.saturating_mul(60))
    }

    /// Workspace directory, falling back to the current directory
    pub fn workspace_dir(&self) -> Result<PathBuf> {
        match &self.workspace {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }
}
