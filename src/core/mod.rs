//! Core domain models for workflows
//!
//! This module defines the fundamental data structures that represent
//! workflows, triggers, job matrices, jobs, steps, and their configuration.

pub mod config;
pub mod context;
pub mod expression;
pub mod job;
pub mod matrix;
pub mod state;
pub mod step;
pub mod trigger;
pub mod workflow;

pub use context::*;
pub use job::*;
pub use matrix::{Matrix, MatrixAxis, MatrixCell, Strategy};
pub use state::*;
pub use step::*;
pub use trigger::*;
pub use workflow::*;
