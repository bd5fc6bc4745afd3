use cirun::cli::output::*;
use cirun::cli::commands::{EventArgs, HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand};
use cirun::cli::{Cli, Command};
use cirun::core::config::WorkflowConfig;
use cirun::core::{EventType, ExecutionStatus, JobStatus, RepoEvent, Secrets, Workflow};
use cirun::execution::{ExecutionEvent, Planner, RunPlan, WorkflowEngine};
use cirun::persistence::{create_summary, InMemoryPersistence, PersistenceBackend, RunSummary};
use cirun::runner::{RunnerConfig, SubprocessRunner};

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set logging subscriber: {}", e);
    }

    // Execute command
    let result = match &cli.command {
        Command::Run(cmd) => run_workflow(cmd, cli.stream).await,
        Command::Validate(cmd) => validate_workflow(cmd),
        Command::Plan(cmd) => plan_workflow(cmd),
        Command::List(cmd) => list_workflows(cmd).await,
        Command::History(cmd) => show_history(cmd).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}{:#}", CROSS, e);
            ExitCode::from(2)
        }
    }
}

fn load_workflow(file: &str) -> Result<Workflow> {
    WorkflowConfig::from_file(file)
        .and_then(|config| config.to_workflow())
        .with_context(|| format!("Failed to load workflow {}", file))
}

fn repo_event(args: &EventArgs) -> RepoEvent {
    RepoEvent::new(EventType::parse(&args.event), args.branch.clone())
}

fn collect_secrets(cmd: &RunCommand) -> Result<Secrets> {
    let mut secrets = match &cmd.secrets_file {
        Some(path) => Secrets::from_file(path)?,
        None => Secrets::new(),
    };
    for name in &cmd.secret_env {
        let value = std::env::var(name)
            .with_context(|| format!("Secret '{}' is not set in the environment", name))?;
        secrets.insert(name.clone(), value);
    }
    for (name, value) in &cmd.secret {
        secrets.insert(name.clone(), value.clone());
    }
    Ok(secrets)
}

async fn open_store(ephemeral: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if ephemeral {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(cirun::persistence::SqliteRunStore::with_default_path().await?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        tracing::warn!("Built without the sqlite feature; run history is not kept");
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

async fn run_workflow(cmd: &RunCommand, stream: bool) -> Result<ExitCode> {
    let workflow = load_workflow(&cmd.file)?;
    println!("{}Loaded workflow: {}", INFO, style(&workflow.name).bold());

    let event = repo_event(&cmd.event);
    let mut plan = Planner::new()
        .with_jobs(cmd.event.job.clone())
        .plan(&workflow, &event)?;

    let secrets = collect_secrets(cmd)?;
    let runner_config = RunnerConfig::load(cmd.runner_config.as_deref())?;
    let workspace = match &cmd.workspace {
        Some(dir) => dir.clone(),
        None => runner_config.workspace_dir()?,
    };

    let store = open_store(cmd.no_history).await?;

    let engine = WorkflowEngine::with_config(
        SubprocessRunner::new(),
        cmd.scheduling_strategy(),
        &runner_config,
    )
    .with_secrets(secrets)
    .with_workspace(workspace);

    // Set up event handler for console output
    let progress = create_progress_bar(plan.jobs.len());
    let bar = progress.clone();
    engine.add_event_handler(move |event| {
        if let Some(line) = format_execution_event(&event, stream) {
            bar.println(line);
        }
        if matches!(
            event,
            ExecutionEvent::JobFinished { .. } | ExecutionEvent::JobSkipped { .. }
        ) {
            bar.inc(1);
        }
    });

    println!();
    let status = engine.execute(&mut plan).await;
    progress.finish_and_clear();
    let status = status?;

    let summary = create_summary(&plan);
    print_run_report(&plan, &summary);

    if !cmd.no_history {
        store.save_run(&summary).await?;
        println!(
            "\n{}Run saved to history (ID: {})",
            INFO,
            style(&summary.run_id.to_string()[..8]).dim()
        );
    }

    if let Some(path) = &cmd.report {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }

    Ok(match status {
        ExecutionStatus::Completed | ExecutionStatus::Skipped => ExitCode::SUCCESS,
        _ => ExitCode::from(1),
    })
}

fn print_run_report(plan: &RunPlan, summary: &RunSummary) {
    if plan.is_skipped() {
        return;
    }

    println!("{}", separator());
    for job in &summary.jobs {
        println!("  {}", format_job_summary(job));
    }
    println!("{}", separator());

    let duration = summary
        .completed_at
        .and_then(|done| done.signed_duration_since(summary.started_at).to_std().ok())
        .map(format_duration)
        .unwrap_or_default();
    let verdict = match summary.status {
        ExecutionStatus::Completed => format!("{}{} {}", CHECK, style(&summary.workflow_name).bold(), style("succeeded").green()),
        status => format!("{}{} {}", CROSS, style(&summary.workflow_name).bold(), format_status(status)),
    };
    println!(
        "{} in {} ({} succeeded, {} failed, {} cancelled, {} skipped)",
        verdict,
        duration,
        summary.count(JobStatus::Succeeded),
        summary.count(JobStatus::Failed),
        summary.count(JobStatus::Cancelled),
        summary.count(JobStatus::Skipped)
    );
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<ExitCode> {
    println!("{}Validating workflow...", INFO);

    let config = match WorkflowConfig::from_file(&cmd.file).and_then(|c| c.to_workflow().map(|w| (c, w))) {
        Ok(loaded) => loaded,
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(ExitCode::from(2));
        }
    };
    let (config, workflow) = config;

    println!("{}Workflow configuration is valid!", CHECK);
    println!("  Name: {}", style(&workflow.name).bold());
    let events: Vec<String> = workflow
        .triggers
        .event_types()
        .iter()
        .map(|e| e.to_string())
        .collect();
    println!("  Triggers: {}", style(events.join(", ")).cyan());
    println!("  Jobs: {}", style(workflow.jobs.len()).cyan());
    for id in workflow.execution_order() {
        if let Some(job) = workflow.job(id) {
            println!(
                "    {} ({} instance(s), {} step(s))",
                style(&job.id).bold(),
                job.strategy.matrix.expand().len(),
                job.steps.len()
            );
        }
    }

    if cmd.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("\n{}", json);
    }
    Ok(ExitCode::SUCCESS)
}

fn plan_workflow(cmd: &PlanCommand) -> Result<ExitCode> {
    let workflow = load_workflow(&cmd.file)?;
    let event = repo_event(&cmd.event);
    let plan = Planner::new()
        .with_jobs(cmd.event.job.clone())
        .plan(&workflow, &event)?;

    if cmd.json {
        let jobs: Vec<serde_json::Value> = plan
            .jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "key": job.key,
                    "name": job.name,
                    "needs": job.definition.needs,
                    "matrix": job.matrix.iter().collect::<std::collections::BTreeMap<_, _>>(),
                    "steps": job.steps.iter().map(|s| s.name.clone()).collect::<Vec<_>>(),
                })
            })
            .collect();
        let data = serde_json::json!({
            "workflow": plan.workflow_name,
            "event": event.event_type.to_string(),
            "branch": event.branch,
            "decision": plan.decision,
            "jobs": jobs,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(ExitCode::SUCCESS);
    }

    if let cirun::core::TriggerDecision::Skip { reason } = &plan.decision {
        println!("{}{} would not run: {}", SKIP, style(&plan.workflow_name).bold(), reason);
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "{}{} would run {} job(s) for {} to {}:",
        ROCKET,
        style(&plan.workflow_name).bold(),
        plan.jobs.len(),
        event.event_type,
        style(&event.branch).cyan()
    );
    for job in &plan.jobs {
        println!("  {} {}", style(&job.key).dim(), style(&job.name).bold());
        for step in &job.steps {
            println!("      {}", step.name);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn list_workflows(cmd: &ListCommand) -> Result<ExitCode> {
    let store = open_store(false).await?;
    let workflows = store.list_workflows().await?;

    if workflows.is_empty() {
        println!("{}No workflows found in history", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    if cmd.json {
        let mut json_data = Vec::new();
        for name in &workflows {
            let runs = store.list_runs(name).await?;
            json_data.push(serde_json::json!({
                "name": name,
                "run_count": runs.len(),
            }));
        }
        let data = serde_json::json!({ "workflows": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}Workflows in history:", INFO);
    for name in &workflows {
        if cmd.with_counts {
            let runs = store.list_runs(name).await?;
            let succeeded = runs.iter().filter(|r| r.status == ExecutionStatus::Completed).count();
            let failed = runs.iter().filter(|r| r.status == ExecutionStatus::Failed).count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(name).bold(),
                style(runs.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(name).bold());
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn show_history(cmd: &HistoryCommand) -> Result<ExitCode> {
    let store = open_store(false).await?;

    // If a specific run is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.verbose)?,
            None => println!("{}Run not found", WARN),
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut runs = match &cmd.workflow {
        Some(name) => store.list_runs(name).await?,
        None => store.list_recent(cmd.limit).await?,
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{}No runs found", INFO);
        return Ok(ExitCode::SUCCESS);
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_run_details(summary: &RunSummary, verbose: bool) -> Result<()> {
    println!("{}Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow_name).bold());
    println!("  Event: {} to {}", summary.event, style(&summary.branch).cyan());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!("  Progress: {}", style(format!("{:.0}%", summary.progress * 100.0)).cyan());
    println!("  Jobs:");
    for job in &summary.jobs {
        println!("    {}", format_job_summary(job));
    }

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
