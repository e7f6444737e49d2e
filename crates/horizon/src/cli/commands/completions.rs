//! Shell completions generation command

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::output;
use crate::cli::Cli;

/// Generate shell completions
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(shell = %self.shell, "executing completions command");
        let mut writer: Box<dyn Write> = match &self.output {
            Some(path) => Box::new(std::fs::File::create(path)?),
            None => Box::new(io::stdout()),
        };
        generate(self.shell, &mut Cli::command(), "horizon", &mut writer);

        if let (Some(path), false) = (&self.output, cli.quiet) {
            output::success(&format!(
                "Completions written to {}",
                output::path_style().apply_to(path.display())
            ));
        }
        Ok(())
    }
}
