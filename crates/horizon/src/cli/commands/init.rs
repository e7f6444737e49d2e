//! Init command: write a starter configuration

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use horizon_core::config::{DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_YAML};

use crate::cli::output;
use crate::cli::Cli;

/// Write a starter configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Overwrite an existing configuration without asking
    #[arg(short, long)]
    pub force: bool,

    /// Path of the configuration file to write
    #[arg(long, default_value = DEFAULT_CONFIG_YAML)]
    pub output: PathBuf,
}

impl InitCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(output = %self.output.display(), force = self.force, "executing init command");

        if self.output.exists() && !self.force {
            let overwrite = dialoguer::Confirm::new()
                .with_prompt(format!("{} already exists. Overwrite?", self.output.display()))
                .default(false)
                .interact()?;
            if !overwrite {
                output::warning("Aborted.");
                return Ok(());
            }
        }

        std::fs::write(&self.output, DEFAULT_CONFIG_TEMPLATE)?;

        if !cli.quiet {
            output::success(&format!(
                "Wrote {}",
                output::path_style().apply_to(self.output.display())
            ));
            output::info("Declare your packages and horizons, then run `horizon validate`.");
        }
        Ok(())
    }
}
