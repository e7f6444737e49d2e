//! Run command: execute tasks and their dependencies

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use horizon_tasks::{
    CacheStore, TaskDag, TaskEvent, TaskReporter, TaskScheduler, TaskStatus, TracingReporter,
};
use horizon_tasks::scheduler::SchedulerOptions;

use super::Workspace;
use crate::cli::output::plural;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::Failure;

/// Run tasks and everything they depend on
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Tasks to run ("task" in every package, or "package:task")
    #[arg(required = true)]
    pub tasks: Vec<String>,

    /// Leave tasks out of the run (can be repeated)
    #[arg(long, short = 'x')]
    pub exclude: Vec<String>,

    /// Maximum concurrent tasks
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Evaluate gates and show the plan without running tasks
    #[arg(long)]
    pub dry_run: bool,

    /// Continue running other tasks when one fails
    #[arg(long)]
    pub continue_on_error: bool,

    /// Disable task cache
    #[arg(long)]
    pub no_cache: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(tasks = ?self.tasks, exclude = ?self.exclude, "executing run command");
        let workspace = Workspace::load()?;
        let project = &workspace.project;

        let targets = TaskDag::select(project, &self.tasks)?;
        let excluded = if self.exclude.is_empty() {
            Vec::new()
        } else {
            TaskDag::select(project, &self.exclude)?
        };
        let dag = TaskDag::build(project, &targets, &excluded)?;

        if dag.is_empty() {
            if !cli.quiet {
                println!("{} No tasks to run.", style("✓").green());
            }
            return Ok(());
        }

        if !cli.quiet && cli.format == OutputFormat::Text {
            println!();
            println!(
                "{} {} task{} in {} wave{}",
                style("→").blue(),
                dag.len(),
                plural(dag.len()),
                dag.waves().len(),
                plural(dag.waves().len()),
            );

            if cli.verbose || self.dry_run {
                println!();
                println!("{}", dag.execution_plan());
            }

            if self.dry_run {
                println!("{}", style("[DRY RUN - gates are evaluated, tasks are not executed]").yellow().bold());
            }
            println!();
        }

        let use_cache = !self.no_cache && workspace.config.tasks.cache.enabled;
        let cache: Option<Arc<dyn CacheStore>> = if use_cache {
            Some(Arc::new(workspace.cache()))
        } else {
            None
        };

        let reporter: Arc<dyn TaskReporter> = if cli.quiet || cli.format == OutputFormat::Json {
            Arc::new(TracingReporter)
        } else {
            Arc::new(ConsoleReporter::new(cli.verbose))
        };

        let options = SchedulerOptions {
            concurrency: self.concurrency.unwrap_or(workspace.config.tasks.concurrency),
            continue_on_error: self.continue_on_error,
            use_cache,
            dry_run: self.dry_run,
            root_dir: workspace.root.clone(),
        };

        let scheduler = TaskScheduler::new(options, cache, reporter)
            .with_history(Arc::new(workspace.history()));
        let results = scheduler.execute(&dag).await;

        let failed: Vec<_> = results
            .iter()
            .filter(|r| matches!(r.status, TaskStatus::Failed(_)))
            .collect();

        if cli.format == OutputFormat::Json {
            let count = |status: TaskStatus| results.iter().filter(|r| r.status == status).count();
            let summary = serde_json::json!({
                "total": results.len(),
                "succeeded": results.iter().filter(|r| r.status.is_success()).count(),
                "failed": failed.len(),
                "cached": count(TaskStatus::CacheHit),
                "up_to_date": count(TaskStatus::UpToDate),
                "disabled": count(TaskStatus::Disabled),
                "tasks": results.iter().map(|r| {
                    serde_json::json!({
                        "id": r.id.to_string(),
                        "status": status_label(&r.status),
                        "duration_ms": r.duration.as_millis(),
                    })
                }).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        if !failed.is_empty() {
            if !cli.quiet && cli.format == OutputFormat::Text {
                println!();
                println!(
                    "  {} {}/{} tasks failed:",
                    style("✗").red().bold(),
                    failed.len(),
                    results.len()
                );
                for r in &failed {
                    if let TaskStatus::Failed(ref err) = r.status {
                        println!("    {} {}: {}", style("✗").red(), r.id, err);
                    }
                }
            }
            return Err(Failure::Tasks(failed.len()).into());
        }

        Ok(())
    }
}

fn status_label(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Success => "success",
        TaskStatus::CacheHit => "cache_hit",
        TaskStatus::UpToDate => "up_to_date",
        TaskStatus::Failed(_) => "failed",
        TaskStatus::Skipped => "skipped",
        TaskStatus::Disabled => "disabled",
    }
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { id, command } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    style(id).bold(),
                    if self.verbose {
                        style(format!("({})", command)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            TaskEvent::Output {
                id,
                line,
                is_stderr,
            } => {
                if self.verbose {
                    if *is_stderr {
                        println!("    {} {}", style(format!("[{}]", id)).red().dim(), line);
                    } else {
                        println!("    {} {}", style(format!("[{}]", id)).dim(), line);
                    }
                }
            }
            TaskEvent::Completed {
                id,
                duration,
                cached,
                up_to_date,
            } => {
                let label = if *up_to_date {
                    style("(up-to-date)").cyan().to_string()
                } else if *cached {
                    style("(cached)").cyan().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} {} {} {}",
                    style("✓").green(),
                    style(id).green(),
                    label,
                    style(format!("{:.1}s", duration.as_secs_f64())).dim()
                );
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(id).red(),
                    style(format!("{:.1}s", duration.as_secs_f64())).dim(),
                    style(error).red().dim()
                );
            }
            TaskEvent::Skipped { id, reason } => {
                println!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(id).yellow(),
                    style(format!("({})", reason)).dim()
                );
            }
            TaskEvent::Disabled { id } => {
                println!(
                    "  {} {} {}",
                    style("○").dim(),
                    style(id).dim(),
                    style("(skipped by horizon)").dim()
                );
            }
            TaskEvent::GateEvaluated {
                horizon,
                outcome,
                disabled,
            } => {
                if let Some(outcome) = outcome {
                    println!(
                        "  {} horizon {} is {}, {} member{} skipped",
                        style("◆").cyan(),
                        style(horizon).bold(),
                        style(outcome).cyan(),
                        disabled,
                        plural(*disabled)
                    );
                }
            }
            TaskEvent::WaveStarted { wave, task_count } => {
                if self.verbose {
                    println!(
                        "  {} Wave {} ({} tasks)",
                        style("─").dim(),
                        wave,
                        task_count
                    );
                }
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cached,
                up_to_date,
                disabled,
                duration,
            } => {
                println!();
                println!(
                    "  {} {}/{} succeeded, {} failed, {} cached, {} up-to-date, {} skipped by horizons ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
                    succeeded,
                    total,
                    failed,
                    cached,
                    up_to_date,
                    disabled,
                    duration.as_secs_f64()
                );
            }
        }
    }
}
