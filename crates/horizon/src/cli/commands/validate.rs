//! Validate command

use clap::Args;
use console::style;
use tracing::info;

use horizon_core::config::{load_config_from_dir, Config};
use horizon_tasks::{Project, TaskDag, TaskId};

use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::Failure;

/// Validate configuration and the task graph
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// Findings of a validation pass
#[derive(Debug, Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(strict = self.strict, "executing validate command");
        let cwd = std::env::current_dir()?;

        let mut findings = Findings::default();
        let config_path = match load_config_from_dir(&cwd) {
            Ok((config, path)) => {
                check_project(&config, &mut findings);
                Some(path)
            }
            Err(e) => {
                findings.errors.push(format!("Configuration: {}", e));
                None
            }
        };

        // If strict, promote warnings to errors
        if self.strict {
            let mut warnings = std::mem::take(&mut findings.warnings);
            findings.errors.append(&mut warnings);
        }

        let Findings { errors, warnings } = findings;
        let passed = errors.is_empty();

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": config_path.map(|p| p.to_string_lossy().to_string()),
                    "errors": errors,
                    "warnings": warnings
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", style("Validation Results").bold());
                    println!();

                    if let Some(path) = config_path {
                        println!("Config: {}", style(path.display()).cyan());
                        println!();
                    }

                    if !errors.is_empty() {
                        println!("{}", style("Errors:").red().bold());
                        for error in &errors {
                            println!("  {} {}", style("✗").red(), error);
                        }
                        println!();
                    }

                    if !warnings.is_empty() {
                        println!("{}", style("Warnings:").yellow().bold());
                        for warning in &warnings {
                            println!("  {} {}", style("!").yellow(), warning);
                        }
                        println!();
                    }

                    if passed {
                        if warnings.is_empty() {
                            println!("{}", style("✓ All checks passed").green().bold());
                        } else {
                            println!(
                                "{} with {} warning(s)",
                                style("✓ Validation passed").green().bold(),
                                warnings.len()
                            );
                        }
                    }
                }
            }
        }

        if !passed {
            return Err(Failure::Validation(errors.len()).into());
        }

        Ok(())
    }
}

/// Declare the project and build the full task graph, collecting problems
fn check_project(config: &Config, findings: &mut Findings) {
    let project = match Project::from_config(config) {
        Ok(project) => project,
        Err(e) => {
            findings.errors.push(format!("Horizons: {}", e));
            return;
        }
    };

    let all: Vec<TaskId> = project.tasks().map(|(id, _)| id.clone()).collect();
    if all.is_empty() {
        findings.warnings.push("No tasks declared".to_string());
    }
    if let Err(e) = TaskDag::build(&project, &all, &[]) {
        findings.errors.push(format!("Task graph: {}", e));
    }

    for group in project.horizons() {
        if group.members().is_empty() {
            findings
                .warnings
                .push(format!("Horizon '{}' has no members", group.name()));
        }
        let declares_outputs = project
            .task(group.representative().id())
            .is_some_and(|task| task.has_outputs());
        if !declares_outputs {
            findings.warnings.push(format!(
                "Horizon '{}' declares no outputs, so its members are never skipped",
                group.name()
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("horizon.yaml");
        std::fs::write(&path, yaml).unwrap();
        horizon_core::config::load_config(&path).unwrap()
    }

    #[test]
    fn test_default_template_is_clean() {
        let mut findings = Findings::default();
        check_project(&config(horizon_core::config::DEFAULT_CONFIG_TEMPLATE), &mut findings);
        assert!(findings.errors.is_empty(), "{:?}", findings.errors);
        assert!(findings.warnings.is_empty(), "{:?}", findings.warnings);
    }

    #[test]
    fn test_invalid_member_is_an_error() {
        let mut findings = Findings::default();
        check_project(
            &config(
                r#"
packages:
  app:
    tasks:
      compile:
        command: make
horizons:
  - name: assemble
    package: app
    members: [compile, 42]
"#,
            ),
            &mut findings,
        );
        assert_eq!(findings.errors.len(), 1);
        assert!(findings.errors[0].contains("Invalid task reference"));
    }

    #[test]
    fn test_missing_dependency_and_output_warning() {
        let mut findings = Findings::default();
        check_project(
            &config(
                r#"
packages:
  app:
    tasks:
      compile:
        command: make
        depends_on: [generate]
horizons:
  - name: assemble
    package: app
    members: [compile]
"#,
            ),
            &mut findings,
        );
        assert!(findings.errors.iter().any(|e| e.starts_with("Task graph")));
        assert!(findings
            .warnings
            .iter()
            .any(|w| w.contains("declares no outputs")));
    }
}
