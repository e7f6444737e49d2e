//! Horizon Tasks - task engine with cache horizons
//!
//! A horizon groups member tasks under a representative task. Before any
//! member runs, a gate probes the representative against its execution
//! history and the task cache without running it, and disables every member
//! when the representative's result is already available.

pub mod cache;
pub mod dag;
pub mod fingerprint;
pub mod gate;
pub mod history;
pub mod horizon;
pub mod outcome;
pub mod pipeline;
pub mod probe;
pub mod project;
pub mod reporter;
pub mod scheduler;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheBackend, CacheEntry, CacheError, CacheKey, CacheStore, TaskCache};
pub use dag::{DagError, TaskDag, TaskNode};
pub use fingerprint::{FileFingerprinter, Fingerprint, FingerprintError, Fingerprinter};
pub use gate::GateDecision;
pub use history::{ExecutionState, FileHistory, HistoryError, HistoryRecorder, HistoryStore};
pub use horizon::{GroupError, HorizonBuilder, HorizonGroup};
pub use outcome::{Outcome, OutcomeKind, ProbeError};
pub use probe::Probe;
pub use project::Project;
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{SchedulerOptions, TaskResult, TaskScheduler, TaskStatus};
pub use task::{Task, TaskCommand, TaskDefinition, TaskHandle, TaskId, TaskRef};
