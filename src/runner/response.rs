//! Command runner result types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types for command execution
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Invalid shell template: {0}")]
    InvalidShell(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which stream a line of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of a finished command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Process exit code (-1 when killed by a signal)
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration: Duration,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
