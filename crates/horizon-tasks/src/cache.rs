//! Content-addressable task cache

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::fingerprint::Fingerprint;
use crate::task::TaskId;

const METADATA_FILE: &str = "metadata.json";
const OUTPUTS_DIR: &str = "outputs";

/// Cache key: SHA-256 over task identity, implementation and inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    /// Derive the cache key from a fingerprint. Outputs do not take part.
    pub fn from_fingerprint(id: &TaskId, fingerprint: &Fingerprint) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(id.package.as_bytes());
        hasher.update(b":");
        hasher.update(id.task_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(fingerprint.implementation.as_bytes());

        for (path, hash) in &fingerprint.inputs {
            hasher.update(b"\0");
            hasher.update(path.as_bytes());
            hasher.update(b"=");
            hasher.update(hash.as_bytes());
        }

        CacheKey(format!("{:x}", hasher.finalize()))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached task result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key
    pub key: CacheKey,
    /// Task ID
    pub task_id: TaskId,
    /// Output file path (relative to root) -> content hash
    pub outputs: BTreeMap<String, String>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Original task duration
    pub duration_ms: u64,
    /// When this entry was created
    pub created_at: String,
}

/// What a task printed and how long it took
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Task duration
    pub duration: Duration,
}

/// Read access to cached results
pub trait CacheBackend: Send + Sync {
    /// Look up a result by key
    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;
}

/// Write access to the cache, used only by real executions
pub trait CacheStore: CacheBackend {
    /// Store the outputs a task produced
    fn store(
        &self,
        key: &CacheKey,
        task_id: &TaskId,
        outputs: &BTreeMap<String, String>,
        root_dir: &Path,
        captured: &CapturedOutput,
    ) -> Result<CacheEntry, CacheError>;

    /// Put a cached result's output files back in place
    fn restore(&self, entry: &CacheEntry, root_dir: &Path) -> Result<(), CacheError>;
}

/// Directory-backed task cache
#[derive(Debug, Clone)]
pub struct TaskCache {
    /// Cache directory
    cache_dir: PathBuf,
}

impl TaskCache {
    /// Create a new task cache
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Create cache with default directory
    pub fn default_dir(root: &Path) -> Self {
        Self::new(root.join(".horizon").join("cache"))
    }

    /// Metadata of every complete entry
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();
        for dir in self.entry_dirs()? {
            if let Some(entry) = read_metadata(&dir) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Remove entries older than `max_age`, and entries missing their metadata.
    ///
    /// Keys in `pinned` survive regardless of age. With `dry_run` nothing is
    /// deleted and the stats describe what would have been.
    pub fn prune(
        &self,
        max_age: Duration,
        pinned: &HashSet<CacheKey>,
        dry_run: bool,
    ) -> Result<PruneStats, CacheError> {
        info!(max_age_secs = max_age.as_secs(), pinned = pinned.len(), dry_run, "pruning cache");
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        let mut stats = PruneStats::default();

        for dir in self.entry_dirs()? {
            stats.total += 1;
            let name = dir.file_name().map(|n| n.to_string_lossy().into_owned());
            let key = CacheKey(name.unwrap_or_default());
            if pinned.contains(&key) {
                stats.pinned += 1;
                stats.kept += 1;
                continue;
            }

            // No metadata means lookup can never hit this entry
            let stale = match read_metadata(&dir)
                .and_then(|entry| chrono::DateTime::parse_from_rfc3339(&entry.created_at).ok())
            {
                Some(created) => created < cutoff,
                None => true,
            };
            if !stale {
                stats.kept += 1;
                continue;
            }

            if dry_run {
                debug!(key = %key, "would remove cache entry");
                stats.removed += 1;
            } else if fs::remove_dir_all(&dir).is_ok() {
                stats.removed += 1;
            } else {
                stats.kept += 1;
            }
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "cache prune complete");
        Ok(stats)
    }

    /// Entry counts per task plus total size on disk
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();

        for dir in self.entry_dirs()? {
            stats.entries += 1;
            match read_metadata(&dir) {
                Some(entry) => *stats.by_task.entry(entry.task_id).or_default() += 1,
                None => stats.incomplete += 1,
            }
            for file in walkdir::WalkDir::new(&dir).into_iter().flatten() {
                if file.file_type().is_file() {
                    if let Ok(meta) = file.metadata() {
                        stats.total_size += meta.len();
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Remove every cached entry
    pub fn clean(&self) -> Result<(), CacheError> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir)?;
        }
        info!(dir = %self.cache_dir.display(), "cache cleaned");
        Ok(())
    }

    /// Get the cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir.join(&key.0)
    }

    fn entry_dirs(&self) -> Result<Vec<PathBuf>, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }
}

fn read_metadata(entry_dir: &Path) -> Option<CacheEntry> {
    let contents = fs::read_to_string(entry_dir.join(METADATA_FILE)).ok()?;
    serde_json::from_str(&contents).ok()
}

impl CacheBackend for TaskCache {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let entry_dir = self.entry_dir(key);
        let metadata_path = entry_dir.join(METADATA_FILE);

        if !metadata_path.exists() {
            debug!(key = %key, "cache miss");
            return Ok(None);
        }

        let contents = fs::read_to_string(&metadata_path)?;
        let entry: CacheEntry = serde_json::from_str(&contents)?;

        // An entry whose output copies are incomplete cannot be restored
        let outputs_dir = entry_dir.join(OUTPUTS_DIR);
        if entry.outputs.keys().any(|rel| !outputs_dir.join(rel).is_file()) {
            debug!(key = %key, "cache entry incomplete, treating as miss");
            return Ok(None);
        }

        debug!(key = %key, task = %entry.task_id, "cache hit");
        Ok(Some(entry))
    }
}

impl CacheStore for TaskCache {
    fn store(
        &self,
        key: &CacheKey,
        task_id: &TaskId,
        outputs: &BTreeMap<String, String>,
        root_dir: &Path,
        captured: &CapturedOutput,
    ) -> Result<CacheEntry, CacheError> {
        debug!(task = %task_id, key = %key, files = outputs.len(), "storing result in cache");
        let entry_dir = self.entry_dir(key);
        let outputs_dir = entry_dir.join(OUTPUTS_DIR);
        fs::create_dir_all(&outputs_dir)?;

        for rel in outputs.keys() {
            let target = outputs_dir.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(root_dir.join(rel), &target)?;
        }

        let entry = CacheEntry {
            key: key.clone(),
            task_id: task_id.clone(),
            outputs: outputs.clone(),
            stdout: captured.stdout.clone(),
            stderr: captured.stderr.clone(),
            duration_ms: captured.duration.as_millis() as u64,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        // Metadata goes last so a half-written entry is never visible
        let json = serde_json::to_string_pretty(&entry)?;
        fs::write(entry_dir.join(METADATA_FILE), json)?;

        Ok(entry)
    }

    fn restore(&self, entry: &CacheEntry, root_dir: &Path) -> Result<(), CacheError> {
        let outputs_dir = self.entry_dir(&entry.key).join(OUTPUTS_DIR);
        for rel in entry.outputs.keys() {
            let target = root_dir.join(rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(outputs_dir.join(rel), &target)?;
        }
        debug!(task = %entry.task_id, files = entry.outputs.len(), "restored outputs from cache");
        Ok(())
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total entries found
    pub total: usize,
    /// Entries removed, or that would be on a dry run
    pub removed: usize,
    /// Entries kept
    pub kept: usize,
    /// Kept entries that were pinned
    pub pinned: usize,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache entries
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
    /// Complete entries per task
    pub by_task: BTreeMap<TaskId, usize>,
    /// Entries without readable metadata
    pub incomplete: usize,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else if self.total_size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        } else {
            format!(
                "{:.1} GB",
                self.total_size as f64 / (1024.0 * 1024.0 * 1024.0)
            )
        }
    }
}

/// Cache errors. A failed `lookup` is the cache-lookup failure the probe reports.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
