//! cirun - run CI workflows locally

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runner;

// Re-export commonly used types
pub use core::{ExecutionStatus, JobInstance, RepoEvent, Secrets, Workflow};
pub use execution::{ExecutionEvent, Planner, RunPlan, SchedulingStrategy, WorkflowEngine};
pub use runner::{CommandRunner, RunnerConfig, SubprocessRunner};
