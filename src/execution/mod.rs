//! Workflow execution engine

pub mod cancel;
pub mod engine;
pub mod executor;
pub mod planner;
pub mod scheduler;

pub use cancel::{CancelHandle, CancelSignal};
pub use engine::{EventBus, ExecutionError, ExecutionEvent, WorkflowEngine};
pub use executor::{JobExecutor, StepOutcome};
pub use planner::{Planner, RunPlan};
pub use scheduler::{ExecutionScheduler, SchedulingStrategy};
