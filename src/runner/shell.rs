//! Shell templates such as `bash -e {0}`

use crate::runner::RunnerError;
use std::path::Path;

/// Default shell used for `run` steps
pub const DEFAULT_SHELL: &str = "bash -e {0}";

/// Placeholder replaced by the script path
const SCRIPT_PLACEHOLDER: &str = "{0}";

/// A parsed shell template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellTemplate {
    program: String,
    args: Vec<String>,
}

impl ShellTemplate {
    /// Parse a template.
    ///
    /// Well-known shell names (`bash`, `sh`, `pwsh`, `python`) expand to their
    /// usual invocation. A template without `{0}` gets the script path appended.
    pub fn parse(template: &str) -> Result<Self, RunnerError> {
        let expanded = match template.trim() {
            "bash" => "bash --noprofile --norc -eo pipefail {0}",
            "sh" => "sh -e {0}",
            "python" => "python {0}",
            "pwsh" => "pwsh -command . '{0}'",
            other => other,
        };

        let mut parts = expanded.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| RunnerError::InvalidShell(template.to_string()))?;
        let mut args: Vec<String> = parts.collect();

        if !program.contains(SCRIPT_PLACEHOLDER)
            && !args.iter().any(|a| a.contains(SCRIPT_PLACEHOLDER))
        {
            args.push(SCRIPT_PLACEHOLDER.to_string());
        }

        Ok(Self { program, args })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with the script path substituted
    pub fn args_for(&self, script: &Path) -> Vec<String> {
        let path = script.display().to_string();
        self.args
            .iter()
            .map(|a| a.replace(SCRIPT_PLACEHOLDER, &path))
            .collect()
    }

    /// File extension the script should carry
    pub fn script_extension(&self) -> &'static str {
        match self.program.as_str() {
            "python" | "python3" => "py",
            "pwsh" | "powershell" => "ps1",
            _ => "sh",
        }
    }
}
