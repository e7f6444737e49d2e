//! Probe command: classify horizons without running anything

use clap::Args;
use console::style;
use tracing::info;

use horizon_tasks::gate::{self, GateDecision};
use horizon_tasks::{FileFingerprinter, GroupError, HorizonGroup, Outcome, Probe, TaskDag};

use super::Workspace;
use crate::cli::output::{self, plural};
use crate::cli::{Cli, OutputFormat};

/// Check whether horizons are satisfiable without running anything
#[derive(Debug, Args)]
pub struct ProbeCommand {
    /// Horizon to probe ("name" or "package:name"); all horizons when omitted
    pub horizon: Option<String>,

    /// Ignore the task cache and only check up-to-date state
    #[arg(long)]
    pub no_cache: bool,
}

impl ProbeCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(horizon = ?self.horizon, "executing probe command");
        let workspace = Workspace::load()?;

        let groups: Vec<&HorizonGroup> = match &self.horizon {
            Some(name) => vec![workspace
                .project
                .horizon(name)
                .ok_or_else(|| GroupError::UnknownHorizon(name.clone()))?],
            None => workspace.project.horizons().iter().collect(),
        };

        if groups.is_empty() {
            if !cli.quiet {
                output::info("No horizons declared.");
            }
            return Ok(());
        }

        let history = workspace.history();
        let cache = workspace.cache();
        let use_cache = !self.no_cache && workspace.config.tasks.cache.enabled;
        let fingerprinter = FileFingerprinter::new(&workspace.root);
        let probe = Probe::new(&history, use_cache.then_some(&cache), &fingerprinter);

        let mut reports = Vec::new();
        for group in groups {
            // A throwaway run graph: disabling here affects nothing real
            let dag = TaskDag::build(
                &workspace.project,
                &[group.representative().id().clone()],
                &[],
            )?;
            let decision = gate::execute(group, &dag, &probe);
            reports.push((group, decision));
        }

        match cli.format {
            OutputFormat::Json => {
                let json: Vec<serde_json::Value> = reports
                    .iter()
                    .map(|(group, decision)| report_json(group, decision))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    for (group, decision) in &reports {
                        print_report(group, decision, cli.verbose);
                    }
                }
            }
        }

        Ok(())
    }
}

fn details(outcome: &Outcome) -> Vec<String> {
    match outcome {
        Outcome::UpToDate => Vec::new(),
        Outcome::FromCache { key } => vec![format!("cache key {}", key)],
        Outcome::RequiresExecution { reasons } => reasons.clone(),
        Outcome::Indeterminate { cause } => vec![cause.to_string()],
    }
}

fn report_json(group: &HorizonGroup, decision: &GateDecision) -> serde_json::Value {
    serde_json::json!({
        "horizon": group.name(),
        "task": group.representative().to_string(),
        "outcome": decision.outcome().map(|o| o.kind()),
        "details": decision.outcome().map(details).unwrap_or_default(),
        "members": group.members().iter().map(|m| m.to_string()).collect::<Vec<_>>(),
        "skippable": decision.disabled_members().iter().map(|m| m.to_string()).collect::<Vec<_>>(),
    })
}

fn print_report(group: &HorizonGroup, decision: &GateDecision, verbose: bool) {
    let Some(outcome) = decision.outcome() else {
        output::warning(&format!("{}: not scheduled", group.name()));
        return;
    };

    let skippable = decision.disabled_members().len();
    let line = format!(
        "{} is {} ({} of {} member{} skippable)",
        style(group.representative()).bold(),
        style(outcome.kind()).cyan(),
        skippable,
        group.members().len(),
        plural(group.members().len())
    );
    if outcome.is_satisfiable() {
        output::success(&line);
    } else {
        output::info(&line);
    }

    if verbose || !outcome.is_satisfiable() {
        for detail in details(outcome) {
            println!("{}", output::key_value("reason", &detail));
        }
    }
}
