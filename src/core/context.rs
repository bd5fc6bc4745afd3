//! Execution context - bindings visible to a running job

use crate::core::{
    expression::{self, split_path, ExpressionResolver},
    matrix::MatrixCell,
    step::Step,
    trigger::RepoEvent,
};
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Placeholder that replaces secret values in output
pub const SECRET_MASK: &str = "***";

/// Named secret values, injected only where a step references them
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: BTreeMap<String, String>,
}

impl Secrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Read `NAME=VALUE` lines; blank lines and `#` comments are ignored
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read secrets file {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut secrets = Self::new();
        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                bail!("Line {} of secrets file is not NAME=VALUE", number + 1);
            };
            secrets.insert(name.trim(), value.trim());
        }
        Ok(secrets)
    }

    /// Replace every secret value in `text` with `***`
    pub fn mask(&self, text: &str) -> String {
        let mut values: Vec<&str> = self
            .values
            .values()
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .collect();
        // Longest first so a secret containing another is masked whole
        values.sort_by_key(|v| std::cmp::Reverse(v.len()));

        let mut masked = text.to_string();
        for value in values {
            if masked.contains(value) {
                masked = masked.replace(value, SECRET_MASK);
            }
        }
        masked
    }
}

/// Execution context for one job instance
///
/// Holds matrix values, layered environment (workflow → job), secrets and
/// the directories the job runs in.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_name: String,

    pub job_id: String,

    pub event: RepoEvent,

    pub matrix: MatrixCell,

    pub secrets: Arc<Secrets>,

    /// Workflow-level env (unrendered)
    pub workflow_env: BTreeMap<String, String>,

    /// Job-level env (unrendered)
    pub job_env: BTreeMap<String, String>,

    /// Repository checkout the steps run in
    pub workspace: PathBuf,

    /// Scratch directory private to this job instance
    pub temp_dir: PathBuf,
}

/// Resolver over the context plus the env visible at a given layer
struct ScopedResolver<'a> {
    context: &'a ExecutionContext,
    env: &'a BTreeMap<String, String>,
}

impl ExpressionResolver for ScopedResolver<'_> {
    fn resolve(&self, expr: &str) -> Option<String> {
        let (root, key) = split_path(expr)?;
        match root {
            "matrix" => self.context.matrix.get(key).map(str::to_string),
            "secrets" => Some(self.context.secrets.get(key).unwrap_or_default().to_string()),
            "env" => self.env.get(key).cloned(),
            "github" => match key {
                "event_name" => Some(self.context.event.event_type.to_string()),
                "ref" => Some(self.context.event.git_ref()),
                "ref_name" | "base_ref" => Some(self.context.event.branch.clone()),
                "workflow" => Some(self.context.workflow_name.clone()),
                "job" => Some(self.context.job_id.clone()),
                "workspace" => Some(self.context.workspace.display().to_string()),
                _ => None,
            },
            "runner" => match key {
                "os" => Some(runner_os().to_string()),
                "temp" => Some(self.context.temp_dir.display().to_string()),
                _ => None,
            },
            _ => None,
        }
    }
}

fn runner_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        other => other,
    }
}

impl ExecutionContext {
    /// Variables every step sees regardless of workflow configuration
    pub fn builtin_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("CIRUN".to_string(), "true".to_string());
        env.insert("CIRUN_WORKFLOW".to_string(), self.workflow_name.clone());
        env.insert("CIRUN_JOB".to_string(), self.job_id.clone());
        env.insert(
            "CIRUN_EVENT_NAME".to_string(),
            self.event.event_type.to_string(),
        );
        env.insert("CIRUN_REF".to_string(), self.event.git_ref());
        env.insert("CIRUN_REF_NAME".to_string(), self.event.branch.clone());
        env.insert(
            "CIRUN_WORKSPACE".to_string(),
            self.workspace.display().to_string(),
        );
        env.insert(
            "RUNNER_TEMP".to_string(),
            self.temp_dir.display().to_string(),
        );
        for (axis, value) in self.matrix.iter() {
            env.insert(format!("MATRIX_{}", env_key(axis)), value.to_string());
        }
        env
    }

    /// Render a template against the given env layer
    pub fn render_with_env(&self, template: &str, env: &BTreeMap<String, String>) -> String {
        let resolver = ScopedResolver { context: self, env };
        expression::render(template, &resolver, |expr| {
            warn!(
                "Unknown expression '{}' in job '{}' rendered as empty string",
                expr, self.job_id
            );
        })
    }

    /// Render a template against workflow + job env
    pub fn render(&self, template: &str) -> String {
        self.render_with_env(template, &self.job_scope_env())
    }

    fn apply_layer(&self, env: &mut BTreeMap<String, String>, layer: &BTreeMap<String, String>) {
        // Each layer sees the layers beneath it
        let snapshot = env.clone();
        for (key, value) in layer {
            env.insert(key.clone(), self.render_with_env(value, &snapshot));
        }
    }

    /// Builtin + workflow + job env, rendered
    pub fn job_scope_env(&self) -> BTreeMap<String, String> {
        let mut env = self.builtin_env();
        self.apply_layer(&mut env, &self.workflow_env);
        self.apply_layer(&mut env, &self.job_env);
        env
    }

    /// Complete environment for one step; step bindings never leak to other steps
    pub fn step_env(&self, step: &Step) -> BTreeMap<String, String> {
        let mut env = self.job_scope_env();
        self.apply_layer(&mut env, &step.env);
        env
    }

    /// Mask secret values in text
    pub fn mask(&self, text: &str) -> String {
        self.secrets.mask(text)
    }
}

/// Normalize a name into an environment variable key
pub fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
