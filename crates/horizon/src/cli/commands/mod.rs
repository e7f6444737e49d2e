//! CLI commands

mod cache;
mod completions;
mod init;
mod probe;
mod run;
mod validate;

pub use cache::CacheCommand;
pub use completions::CompletionsCommand;
pub use init::InitCommand;
pub use probe::ProbeCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use horizon_core::config::{load_config_from_dir, load_config_or_default, Config};
use horizon_tasks::{FileHistory, Project, TaskCache};

/// A loaded workspace: configuration, its root and the declared project
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
    pub config_path: PathBuf,
    pub project: Project,
}

impl Workspace {
    /// Load the configuration found from the current directory upwards
    pub fn load() -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let (config, config_path) =
            load_config_from_dir(&cwd).context("Failed to load horizon configuration")?;
        let root = workspace_root(&config_path).unwrap_or(cwd);
        debug!(root = %root.display(), "workspace root");

        let project = Project::from_config(&config)?;
        Ok(Self {
            root,
            config,
            config_path,
            project,
        })
    }

    /// Execution history configured for this workspace
    pub fn history(&self) -> FileHistory {
        FileHistory::new(self.root.join(&self.config.tasks.history.dir))
    }

    /// Task cache configured for this workspace
    pub fn cache(&self) -> TaskCache {
        TaskCache::new(self.root.join(&self.config.tasks.cache.dir))
    }
}

/// Task cache and execution history for the current directory, with or
/// without a configuration file
pub fn current_stores() -> anyhow::Result<(TaskCache, FileHistory)> {
    let cwd = std::env::current_dir()?;
    let (config, config_path) = load_config_or_default(&cwd);
    let root = config_path
        .as_deref()
        .and_then(workspace_root)
        .unwrap_or(cwd);
    Ok((
        TaskCache::new(root.join(&config.tasks.cache.dir)),
        FileHistory::new(root.join(&config.tasks.history.dir)),
    ))
}

/// Directory a configuration file governs (`.config/` is looked through)
fn workspace_root(config_path: &Path) -> Option<PathBuf> {
    let parent = config_path.parent()?;
    if parent.file_name().is_some_and(|name| name == ".config") {
        parent.parent().map(Path::to_path_buf)
    } else {
        Some(parent.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_root() {
        assert_eq!(
            workspace_root(Path::new("/repo/horizon.yaml")),
            Some(PathBuf::from("/repo"))
        );
        assert_eq!(
            workspace_root(Path::new("/repo/.config/horizon.yaml")),
            Some(PathBuf::from("/repo"))
        );
    }
}
