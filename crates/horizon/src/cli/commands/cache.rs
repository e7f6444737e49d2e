//! Cache management command

use std::collections::HashSet;
use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use horizon_tasks::cache::CacheStats;
use horizon_tasks::{CacheKey, TaskId};

use super::current_stores;
use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// Task cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove stale entries, keeping those execution history still points at
    Prune(CachePruneCommand),
    /// Show entries per task and how many are still referenced
    Status(CacheStatusCommand),
    /// Remove every entry
    Clean(CacheCleanCommand),
}

#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days
    #[arg(long, default_value = "7")]
    pub max_age_days: u64,

    /// Also prune entries that recorded history still references
    #[arg(long)]
    pub include_referenced: bool,

    /// Report what would be removed without deleting anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct CacheStatusCommand;

#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.action {
            CacheAction::Prune(cmd) => cmd.execute(cli),
            CacheAction::Status(cmd) => cmd.execute(cli),
            CacheAction::Clean(cmd) => cmd.execute(cli),
        }
    }
}

impl CachePruneCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            max_age_days = self.max_age_days,
            include_referenced = self.include_referenced,
            dry_run = self.dry_run,
            "executing cache prune command"
        );
        let (cache, history) = current_stores()?;
        let pinned: HashSet<CacheKey> = if self.include_referenced {
            HashSet::new()
        } else {
            history.referenced_cache_keys()?
        };

        let max_age = Duration::from_secs(self.max_age_days * 24 * 60 * 60);
        let stats = cache.prune(max_age, &pinned, self.dry_run)?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "dry_run": self.dry_run,
                "total": stats.total,
                "removed": stats.removed,
                "kept": stats.kept,
                "pinned": stats.pinned,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            let verb = if self.dry_run { "Would remove" } else { "Removed" };
            output::success(&format!(
                "{} {} of {} entr{} older than {} days",
                verb,
                stats.removed,
                stats.total,
                if stats.total == 1 { "y" } else { "ies" },
                self.max_age_days
            ));
            if stats.pinned > 0 {
                output::info(&format!(
                    "{} entr{} kept because history still references {}",
                    stats.pinned,
                    if stats.pinned == 1 { "y" } else { "ies" },
                    if stats.pinned == 1 { "it" } else { "them" }
                ));
            }
        }

        Ok(())
    }
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (cache, history) = current_stores()?;
        let stats = cache.status()?;
        let referenced = history.referenced_cache_keys()?;
        let live = cache
            .entries()?
            .iter()
            .filter(|entry| referenced.contains(&entry.key))
            .count();

        if cli.format == OutputFormat::Json {
            let tasks: serde_json::Map<String, serde_json::Value> = stats
                .by_task
                .iter()
                .map(|(id, count)| (id.to_string(), serde_json::json!(count)))
                .collect();
            let result = serde_json::json!({
                "cache_dir": cache.cache_dir().display().to_string(),
                "entries": stats.entries,
                "referenced": live,
                "incomplete": stats.incomplete,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "tasks": tasks,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", style("Task Cache").bold());
            println!(
                "{}",
                output::key_value(
                    "location",
                    &output::path_style()
                        .apply_to(cache.cache_dir().display())
                        .to_string()
                )
            );
            println!("{}", output::key_value("entries", &stats.entries.to_string()));
            println!("{}", output::key_value("referenced by history", &live.to_string()));
            if stats.incomplete > 0 {
                println!("{}", output::key_value("incomplete", &stats.incomplete.to_string()));
            }
            println!("{}", output::key_value("size", &stats.formatted_size()));

            let busiest = busiest_tasks(&stats);
            if !busiest.is_empty() {
                println!();
                for (id, count) in busiest {
                    println!("  {:>4}  {}", count, id);
                }
            }
        }

        Ok(())
    }
}

/// Tasks ordered by entry count, most first
fn busiest_tasks(stats: &CacheStats) -> Vec<(&TaskId, usize)> {
    let mut tasks: Vec<(&TaskId, usize)> = stats.by_task.iter().map(|(id, n)| (id, *n)).collect();
    tasks.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    tasks
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let (cache, _) = current_stores()?;
        let cache_dir = cache.cache_dir().to_path_buf();

        if !cache_dir.exists() {
            if !cli.quiet {
                output::info("Nothing cached yet.");
            }
            return Ok(());
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!("Remove every cache entry in {}?", cache_dir.display()))
                .default(false)
                .interact()?;
            if !confirmed {
                output::warning("Aborted.");
                return Ok(());
            }
        }

        cache.clean()?;
        if !cli.quiet {
            output::success(&format!(
                "Cleared {}",
                output::path_style().apply_to(cache_dir.display())
            ));
        }
        Ok(())
    }
}
