//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobState, JobStatus, StepState},
    execution::ExecutionEvent,
    persistence::{JobSummary, RunSummary},
    runner::OutputStream,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar over job instances
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Horizontal rule spanning the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    style("─".repeat(width.min(120))).dim().to_string()
}

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Succeeded { .. } => style("SUCCEEDED").green().to_string(),
        StepState::Failed {
            continued: true, ..
        } => style("FAILED (continued)").yellow().to_string(),
        StepState::Failed { .. } => style("FAILED").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => style("PENDING").dim().to_string(),
        JobStatus::Running => style("RUNNING").yellow().to_string(),
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Cancelled => style("CANCELLED").yellow().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a run status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn status_icon(status: JobStatus) -> Emoji<'static, 'static> {
    match status {
        JobStatus::Succeeded => CHECK,
        JobStatus::Failed => CROSS,
        JobStatus::Cancelled => WARN,
        JobStatus::Skipped => SKIP,
        JobStatus::Pending | JobStatus::Running => SPINNER,
    }
}

/// One line per job for the end-of-run table
pub fn format_job_summary(job: &JobSummary) -> String {
    let mut line = format!(
        "{}{} {}",
        status_icon(job.status),
        style(&job.name).bold(),
        format_job_status(job.status)
    );
    if let Some(step) = &job.failed_step {
        line.push_str(&format!(" at {}", style(step).red()));
    }
    if let Some(code) = job.exit_code.filter(|c| *c != 0) {
        line.push_str(&format!(" (exit {})", code));
    }
    if let Some(detail) = &job.detail {
        line.push_str(&format!(" - {}", style(detail).dim()));
    }
    line
}

/// Format run summary for display
pub fn format_run_summary(summary: &RunSummary) -> String {
    let icon = match summary.status {
        ExecutionStatus::Completed => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Skipped => SKIP,
        _ => INFO,
    };

    format!(
        "{}{} - {} - {} to {} - {} ({}/{} jobs succeeded)",
        icon,
        style(&summary.run_id.to_string()[..8]).dim(),
        style(&summary.workflow_name).bold(),
        summary.event,
        style(&summary.branch).cyan(),
        format_status(summary.status),
        summary.count(JobStatus::Succeeded),
        summary.jobs.len()
    )
}

/// Format an execution event for display.
///
/// Output lines are only shown when streaming; `None` means print nothing.
pub fn format_execution_event(event: &ExecutionEvent, stream: bool) -> Option<String> {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            workflow_name,
            event,
            total_jobs,
        } => Some(format!(
            "{}Running {} for {} to {} ({} jobs, {})",
            ROCKET,
            style(workflow_name).bold(),
            event.event_type,
            style(&event.branch).cyan(),
            total_jobs,
            style(&run_id.to_string()[..8]).dim()
        )),
        ExecutionEvent::RunSkipped {
            workflow_name,
            reason,
            ..
        } => Some(format!(
            "{}{} not triggered: {}",
            SKIP,
            style(workflow_name).bold(),
            reason
        )),
        ExecutionEvent::JobStarted { name, .. } => {
            Some(format!("{}{}", SPINNER, style(name).cyan()))
        }
        ExecutionEvent::JobSkipped { name, reason, .. } => Some(format!(
            "{}{} skipped: {}",
            SKIP,
            style(name).dim(),
            reason
        )),
        ExecutionEvent::StepStarted { job_key, name, .. } => Some(format!(
            "  {} {}",
            style(format!("[{}]", job_key)).dim(),
            name
        )),
        ExecutionEvent::StepOutput {
            job_key,
            stream: source,
            line,
            ..
        } => stream.then(|| {
            let prefix = style(format!("  {} │", job_key)).dim();
            match source {
                OutputStream::Stdout => format!("{} {}", prefix, line),
                OutputStream::Stderr => format!("{} {}", prefix, style(line).yellow()),
            }
        }),
        ExecutionEvent::StepFinished {
            job_key,
            step_id,
            state,
        } => match state {
            StepState::Failed { error, .. } => Some(format!(
                "  {} {} {}: {}",
                style(format!("[{}]", job_key)).dim(),
                style(step_id).red(),
                format_step_state(state),
                style(error).dim()
            )),
            _ => None,
        },
        ExecutionEvent::JobFinished { name, state, .. } => {
            let status = state.status();
            let detail = match state {
                JobState::Failed { failed_step, exit_code, .. } => {
                    format!(" at {} (exit {})", style(failed_step).red(), exit_code)
                }
                JobState::Cancelled { reason } => format!(": {}", reason),
                _ => String::new(),
            };
            Some(format!(
                "{}{} {}{}",
                status_icon(status),
                style(name).bold(),
                format_job_status(status),
                detail
            ))
        }
        ExecutionEvent::RunFinished { run_id, status } => Some(format!(
            "{}Run {} {}",
            INFO,
            style(&run_id.to_string()[..8]).dim(),
            format_status(*status)
        )),
    }
}

/// Format a duration as `1h 2m 3s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
