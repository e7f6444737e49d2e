//! Read-only probe: can a task's result be obtained without running it?

use tracing::{debug, instrument, warn};

use crate::cache::CacheBackend;
use crate::dag::TaskNode;
use crate::fingerprint::Fingerprinter;
use crate::history::HistoryStore;
use crate::outcome::Outcome;
use crate::pipeline::{self, CachingState};

/// Classifies a task against its history and the cache.
///
/// A probe only holds read access to its collaborators, so it cannot record
/// history or store cache entries. It stops where a real execution would
/// start running the action.
pub struct Probe<'a, H: ?Sized, C: ?Sized> {
    history: &'a H,
    cache: Option<&'a C>,
    fingerprinter: &'a dyn Fingerprinter,
}

impl<'a, H, C> Probe<'a, H, C>
where
    H: HistoryStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    /// Create a probe. Without a cache only up-to-date checks are possible.
    pub fn new(history: &'a H, cache: Option<&'a C>, fingerprinter: &'a dyn Fingerprinter) -> Self {
        Self {
            history,
            cache,
            fingerprinter,
        }
    }

    /// Classify a scheduled task
    #[instrument(skip_all, fields(task = %node.id))]
    pub fn run(&self, node: &TaskNode) -> Outcome {
        let resolution =
            match pipeline::resolve(node, self.history, self.cache, self.fingerprinter) {
                Ok(resolution) => resolution,
                Err(cause) => {
                    warn!(task = %node.id, error = %cause, "probe could not classify task");
                    return Outcome::Indeterminate { cause };
                }
            };

        let outcome = match resolution.state {
            CachingState::UpToDate => Outcome::UpToDate,
            CachingState::FromCache(entry) => Outcome::FromCache { key: entry.key },
            CachingState::Execute { reasons } => Outcome::RequiresExecution { reasons },
        };
        debug!(task = %node.id, outcome = %outcome.kind(), "probe finished");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use crate::cache::{CacheKey, CacheStore, CapturedOutput, TaskCache};
    use crate::fingerprint::FileFingerprinter;
    use crate::history::{ExecutionState, FileHistory, HistoryRecorder};
    use crate::outcome::{OutcomeKind, ProbeError};
    use crate::task::TaskDefinition;
    use crate::testing::{
        empty_entry, node_for, AuditedCache, AuditedHistory, FailingFingerprinter,
    };
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn assemble() -> TaskDefinition {
        TaskDefinition::new("assemble")
            .with_command("touch probe-marker && cp src/main.c build/app.bin")
            .with_inputs(vec!["src/*.c".to_string()])
            .with_outputs(vec!["build/app.bin".to_string()])
            .with_cacheable(true)
    }

    /// Stand in for a successful execution: outputs on disk plus recorded history
    fn simulate_run(
        root: &Path,
        fingerprinter: &FileFingerprinter,
        history: &dyn HistoryRecorder,
        cache: Option<&TaskCache>,
    ) {
        write(root, "app/build/app.bin", "binary");
        let node = node_for("app", assemble());
        let after = fingerprinter.capture(&node).unwrap();
        let key = CacheKey::from_fingerprint(&node.id, &after);
        if let Some(cache) = cache {
            cache
                .store(&key, &node.id, &after.outputs, root, &CapturedOutput::default())
                .unwrap();
        }
        let state = ExecutionState::after_execution(node.id.clone(), &after, after.outputs.clone(), Some(key));
        history.record(&state).unwrap();
    }

    #[test]
    fn test_up_to_date_when_nothing_changed() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "app/src/main.c", "int main() {}");
        let fingerprinter = FileFingerprinter::new(root);
        let history = FileHistory::default_dir(root);
        simulate_run(root, &fingerprinter, &history, None);

        let probe = Probe::<_, TaskCache>::new(&history, None, &fingerprinter);
        let outcome = probe.run(&node_for("app", assemble()));
        assert_eq!(outcome.kind(), OutcomeKind::UpToDate);
    }

    #[test]
    fn test_from_cache_when_history_is_stale() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "app/src/main.c", "int main() {}");
        let fingerprinter = FileFingerprinter::new(root);
        let cache = TaskCache::default_dir(root);
        let history = FileHistory::default_dir(root);
        simulate_run(root, &fingerprinter, &history, Some(&cache));

        // Fresh checkout: no outputs on disk, history from an older revision
        fs::remove_dir_all(root.join("app/build")).unwrap();
        let mut stale = history
            .load_prior_state(&node_for("app", assemble()).id)
            .unwrap()
            .unwrap();
        stale.inputs.insert("app/src/main.c".to_string(), "old".to_string());
        history.record(&stale).unwrap();

        let probe = Probe::new(&history, Some(&cache), &fingerprinter);
        let outcome = probe.run(&node_for("app", assemble()));
        assert_eq!(outcome.kind(), OutcomeKind::FromCache);
        assert!(!root.join("app/build/app.bin").exists());
    }

    #[test]
    fn test_requires_execution_after_input_change() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "app/src/main.c", "int main() {}");
        let fingerprinter = FileFingerprinter::new(root);
        let cache = TaskCache::default_dir(root);
        let history = FileHistory::default_dir(root);
        simulate_run(root, &fingerprinter, &history, Some(&cache));

        write(root, "app/src/main.c", "int main() { return 1; }");

        let probe = Probe::new(&history, Some(&cache), &fingerprinter);
        match probe.run(&node_for("app", assemble())) {
            Outcome::RequiresExecution { reasons } => {
                assert_eq!(reasons, vec!["Input file app/src/main.c has changed."]);
            }
            other => panic!("unexpected outcome: {}", other),
        }
    }

    #[test]
    fn test_probe_never_runs_the_action() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "app/src/main.c", "int main() {}");
        let fingerprinter = FileFingerprinter::new(root);
        let history = FileHistory::default_dir(root);
        let cache = TaskCache::default_dir(root);

        let probe = Probe::new(&history, Some(&cache), &fingerprinter);
        let outcome = probe.run(&node_for("app", assemble()));

        assert_eq!(outcome.kind(), OutcomeKind::RequiresExecution);
        assert!(!root.join("probe-marker").exists());
        assert!(!root.join("app/probe-marker").exists());
        assert!(!root.join("app/build/app.bin").exists());
    }

    #[test]
    fn test_probe_is_idempotent_and_read_only() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "app/src/main.c", "int main() {}");
        write(root, "app/build/app.bin", "binary");
        let fingerprinter = FileFingerprinter::new(root);
        let node = node_for("app", assemble());
        let fp = fingerprinter.capture(&node).unwrap();

        let history = AuditedHistory::with_state(ExecutionState::after_execution(
            node.id.clone(),
            &fp,
            fp.outputs.clone(),
            None,
        ));
        let cache = AuditedCache::default();
        let probe = Probe::new(&history, Some(&cache), &fingerprinter);

        let first = probe.run(&node);
        let second = probe.run(&node);
        assert_eq!(first.kind(), OutcomeKind::UpToDate);
        assert_eq!(first.kind(), second.kind());

        write(root, "app/src/main.c", "changed");
        let third = probe.run(&node);
        let fourth = probe.run(&node);
        assert_eq!(third.kind(), OutcomeKind::RequiresExecution);
        assert_eq!(third.kind(), fourth.kind());

        assert_eq!(history.reads(), 4);
        assert_eq!(history.writes(), 0);
        assert_eq!(cache.writes(), 0);
        assert_eq!(cache.restores(), 0);
    }

    #[test]
    fn test_missing_input_is_indeterminate() {
        let node = node_for("app", assemble());
        let history = AuditedHistory::default();
        let probe = Probe::<_, AuditedCache>::new(&history, None, &FailingFingerprinter);

        let outcome = probe.run(&node);
        assert!(matches!(
            outcome,
            Outcome::Indeterminate {
                cause: ProbeError::Fingerprint(_)
            }
        ));
    }

    #[test]
    fn test_history_failure_is_indeterminate() {
        let temp = TempDir::new().unwrap();
        let fingerprinter = FileFingerprinter::new(temp.path());
        let history = AuditedHistory::failing();
        let probe = Probe::<_, AuditedCache>::new(&history, None, &fingerprinter);

        let outcome = probe.run(&node_for("app", assemble()));
        assert!(matches!(
            outcome,
            Outcome::Indeterminate {
                cause: ProbeError::History(_)
            }
        ));
    }

    #[test]
    fn test_unreachable_cache_is_indeterminate() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "app/src/main.c", "int main() {}");
        let fingerprinter = FileFingerprinter::new(temp.path());
        let history = AuditedHistory::default();
        let cache = AuditedCache::unreachable();
        let probe = Probe::new(&history, Some(&cache), &fingerprinter);

        let outcome = probe.run(&node_for("app", assemble()));
        assert!(matches!(
            outcome,
            Outcome::Indeterminate {
                cause: ProbeError::CacheLookup(_)
            }
        ));
        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_audited_cache_hit_reports_key() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "app/src/main.c", "int main() {}");
        let fingerprinter = FileFingerprinter::new(temp.path());
        let node = node_for("app", assemble());
        let key = CacheKey::from_fingerprint(&node.id, &fingerprinter.capture(&node).unwrap());

        let cache = AuditedCache::default();
        cache.insert(empty_entry(key.clone(), node.id.clone()));
        let history = AuditedHistory::default();
        let probe = Probe::new(&history, Some(&cache), &fingerprinter);

        match probe.run(&node) {
            Outcome::FromCache { key: hit } => assert_eq!(hit, key),
            other => panic!("unexpected outcome: {}", other),
        }
    }
}
