//! Persisted execution history: one state per task, written after real runs

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cache::CacheKey;
use crate::fingerprint::Fingerprint;
use crate::task::TaskId;

/// Fingerprint of a task's inputs and outputs as of its last successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Task this state belongs to
    pub task_id: TaskId,
    /// Implementation hash at the time of execution
    pub implementation: String,
    /// Input hashes captured before execution
    pub inputs: BTreeMap<String, String>,
    /// Output hashes captured after execution
    pub outputs: BTreeMap<String, String>,
    /// Cache key the result was stored under, if any
    #[serde(default)]
    pub cache_key: Option<CacheKey>,
    /// When this state was recorded (RFC 3339)
    pub recorded_at: String,
}

impl ExecutionState {
    /// Build the state recorded after an execution
    pub fn after_execution(
        task_id: TaskId,
        before: &Fingerprint,
        outputs: BTreeMap<String, String>,
        cache_key: Option<CacheKey>,
    ) -> Self {
        Self {
            task_id,
            implementation: before.implementation.clone(),
            inputs: before.inputs.clone(),
            outputs,
            cache_key,
            recorded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Read access to execution history
pub trait HistoryStore: Send + Sync {
    /// State recorded by the task's last successful execution, if any
    fn load_prior_state(&self, id: &TaskId) -> Result<Option<ExecutionState>, HistoryError>;
}

/// Write access to execution history, used only by real executions
pub trait HistoryRecorder: HistoryStore {
    /// Record the state left by a successful execution
    fn record(&self, state: &ExecutionState) -> Result<(), HistoryError>;
}

/// History stored as `<dir>/<package>/<task>.json`
#[derive(Debug, Clone)]
pub struct FileHistory {
    dir: PathBuf,
}

impl FileHistory {
    /// Create a history store in a directory
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Create history with default directory
    pub fn default_dir(root: &Path) -> Self {
        Self::new(root.join(".horizon").join("history"))
    }

    /// History directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every readable recorded state. Unparseable files are skipped with a warning.
    pub fn states(&self) -> Result<Vec<ExecutionState>, HistoryError> {
        let mut states = Vec::new();
        if !self.dir.exists() {
            return Ok(states);
        }

        for file in WalkDir::new(&self.dir).into_iter() {
            let file = file.map_err(|e| HistoryError::Io(e.into()))?;
            let path = file.path();
            let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
            if !file.file_type().is_file() || !is_json {
                continue;
            }
            let contents = fs::read_to_string(path)?;
            match serde_json::from_str::<ExecutionState>(&contents) {
                Ok(state) => states.push(state),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable history"),
            }
        }
        Ok(states)
    }

    /// Cache keys that recorded states still point at
    pub fn referenced_cache_keys(&self) -> Result<HashSet<CacheKey>, HistoryError> {
        Ok(self
            .states()?
            .into_iter()
            .filter_map(|state| state.cache_key)
            .collect())
    }

    fn state_path(&self, id: &TaskId) -> PathBuf {
        self.dir
            .join(&id.package)
            .join(format!("{}.json", id.task_name))
    }
}

impl HistoryStore for FileHistory {
    fn load_prior_state(&self, id: &TaskId) -> Result<Option<ExecutionState>, HistoryError> {
        let path = self.state_path(id);
        if !path.exists() {
            debug!(task = %id, "no execution history");
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)?;
        let state: ExecutionState = serde_json::from_str(&contents)?;
        debug!(task = %id, recorded_at = %state.recorded_at, "loaded execution history");
        Ok(Some(state))
    }
}

impl HistoryRecorder for FileHistory {
    fn record(&self, state: &ExecutionState) -> Result<(), HistoryError> {
        let path = self.state_path(&state.task_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&path, json)?;
        debug!(task = %state.task_id, "recorded execution history");
        Ok(())
    }
}

/// History errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// IO error
    #[error("History IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("History serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
