//! In-memory collaborators for tests. Every write is counted.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::cache::{CacheBackend, CacheEntry, CacheError, CacheKey, CacheStore, CapturedOutput};
use crate::dag::{TaskDag, TaskNode};
use crate::fingerprint::{Fingerprint, FingerprintError, Fingerprinter};
use crate::history::{ExecutionState, HistoryError, HistoryRecorder, HistoryStore};
use crate::project::Project;
use crate::task::{TaskDefinition, TaskId};

/// Schedule a single task and return its node
pub(crate) fn node_for(package: &str, definition: TaskDefinition) -> TaskNode {
    let mut project = Project::new();
    let handle = project.register(package, definition).unwrap();
    let dag = TaskDag::build(&project, &[handle.id().clone()], &[]).unwrap();
    dag.get(handle.id()).unwrap().clone()
}

#[derive(Debug, Default)]
pub(crate) struct AuditedHistory {
    states: Mutex<HashMap<TaskId, ExecutionState>>,
    fail_reads: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl AuditedHistory {
    pub(crate) fn with_state(state: ExecutionState) -> Self {
        let history = Self::default();
        history
            .states
            .lock()
            .unwrap()
            .insert(state.task_id.clone(), state);
        history
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_reads: true,
            ..Default::default()
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl HistoryStore for AuditedHistory {
    fn load_prior_state(&self, id: &TaskId) -> Result<Option<ExecutionState>, HistoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(HistoryError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "history unavailable",
            )));
        }
        Ok(self.states.lock().unwrap().get(id).cloned())
    }
}

impl HistoryRecorder for AuditedHistory {
    fn record(&self, state: &ExecutionState) -> Result<(), HistoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.states
            .lock()
            .unwrap()
            .insert(state.task_id.clone(), state.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct AuditedCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    hit_for_any: bool,
    unreachable: bool,
    lookups: AtomicUsize,
    writes: AtomicUsize,
    restores: AtomicUsize,
}

impl AuditedCache {
    /// A cache that answers every lookup with an empty entry
    pub(crate) fn hit_for_any() -> Self {
        Self {
            hit_for_any: true,
            ..Default::default()
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub(crate) fn insert(&self, entry: CacheEntry) {
        self.entries
            .lock()
            .unwrap()
            .insert(entry.key.clone(), entry);
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

pub(crate) fn empty_entry(key: CacheKey, task_id: TaskId) -> CacheEntry {
    CacheEntry {
        key,
        task_id,
        outputs: BTreeMap::new(),
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 0,
        created_at: String::new(),
    }
}

impl CacheBackend for AuditedCache {
    fn lookup(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unreachable {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "cache backend unreachable",
            )));
        }
        if self.hit_for_any {
            return Ok(Some(empty_entry(key.clone(), TaskId::new("any", "any"))));
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }
}

impl CacheStore for AuditedCache {
    fn store(
        &self,
        key: &CacheKey,
        task_id: &TaskId,
        outputs: &BTreeMap<String, String>,
        _root_dir: &Path,
        captured: &CapturedOutput,
    ) -> Result<CacheEntry, CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut entry = empty_entry(key.clone(), task_id.clone());
        entry.outputs = outputs.clone();
        entry.stdout = captured.stdout.clone();
        self.insert(entry.clone());
        Ok(entry)
    }

    fn restore(&self, _entry: &CacheEntry, _root_dir: &Path) -> Result<(), CacheError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Returns the same fingerprint for every task
#[derive(Debug)]
pub(crate) struct FixedFingerprinter(pub Fingerprint);

impl Fingerprinter for FixedFingerprinter {
    fn capture(&self, _node: &TaskNode) -> Result<Fingerprint, FingerprintError> {
        Ok(self.0.clone())
    }
}

/// Fails as if a declared input were missing
#[derive(Debug)]
pub(crate) struct FailingFingerprinter;

impl Fingerprinter for FailingFingerprinter {
    fn capture(&self, node: &TaskNode) -> Result<Fingerprint, FingerprintError> {
        Err(FingerprintError::MissingInput(PathBuf::from(format!(
            "{}/missing.txt",
            node.id.package
        ))))
    }
}
