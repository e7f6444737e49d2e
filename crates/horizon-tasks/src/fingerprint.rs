//! Fingerprinting of a task's declared inputs and outputs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::dag::TaskNode;
use crate::history::ExecutionState;
use crate::task::TaskDefinition;

/// Version mixed into every implementation hash so upgrades invalidate old state
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content-derived summary of a task's declared inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Hash over the action, environment and value inputs
    pub implementation: String,
    /// Input file path (relative to the root) -> content hash
    pub inputs: BTreeMap<String, String>,
    /// Output file path (relative to the root) -> content hash
    pub outputs: BTreeMap<String, String>,
}

/// Computes fingerprints the same way for real executions and probes.
///
/// Implementations only read declared inputs and outputs; they never run the task.
pub trait Fingerprinter: Send + Sync {
    /// Fingerprint the task's current inputs and outputs
    fn capture(&self, node: &TaskNode) -> Result<Fingerprint, FingerprintError>;

    /// Output files that the task's previous execution did not produce
    fn detect_overlapping_outputs(
        &self,
        current: &Fingerprint,
        prior: Option<&ExecutionState>,
    ) -> Vec<String> {
        overlapping_outputs(current, prior)
    }
}

/// Output files present now that are absent from, or differ from, the prior
/// execution's outputs. Without prior state every existing output overlaps.
pub fn overlapping_outputs(current: &Fingerprint, prior: Option<&ExecutionState>) -> Vec<String> {
    current
        .outputs
        .iter()
        .filter(|(path, hash)| match prior {
            Some(state) => state.outputs.get(*path) != Some(*hash),
            None => true,
        })
        .map(|(path, _)| path.clone())
        .collect()
}

/// Hash over everything about a task that is not a file
pub fn implementation_hash(definition: &TaskDefinition) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ENGINE_VERSION.as_bytes());
    hasher.update(b"\0");
    let command = definition.effective_command();
    hasher.update(command.kind().as_bytes());
    if let Some(cmd) = &definition.command {
        hasher.update(b"\0");
        hasher.update(cmd.as_bytes());
    }

    // Sorted for determinism
    let sorted_env: BTreeMap<_, _> = definition.env.iter().collect();
    for (k, v) in sorted_env {
        hasher.update(b"\0env:");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    for (k, v) in &definition.properties {
        hasher.update(b"\0prop:");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    for pattern in &definition.outputs {
        hasher.update(b"\0out:");
        hasher.update(pattern.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// Fingerprints files on disk. Globs are relative to `<root>/<package>`.
#[derive(Debug, Clone)]
pub struct FileFingerprinter {
    root_dir: PathBuf,
}

impl FileFingerprinter {
    /// Create a fingerprinter rooted at the workspace directory
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn hash_patterns(
        &self,
        package: &str,
        patterns: &[String],
        require_literals: bool,
    ) -> Result<BTreeMap<String, String>, FingerprintError> {
        let pkg_dir = self.root_dir.join(package);
        let mut hashes = BTreeMap::new();

        for pattern in patterns {
            let full_pattern = pkg_dir.join(pattern);
            if require_literals && !is_glob(pattern) && !full_pattern.exists() {
                return Err(FingerprintError::MissingInput(full_pattern));
            }

            let full_pattern = full_pattern.to_string_lossy().to_string();
            for entry in glob::glob(&full_pattern)? {
                let path = entry.map_err(|e| FingerprintError::Io {
                    path: e.path().to_path_buf(),
                    source: e.into_error(),
                })?;
                if path.is_dir() {
                    for file in WalkDir::new(&path).sort_by_file_name() {
                        let file = file.map_err(|e| FingerprintError::Io {
                            path: path.clone(),
                            source: e.into(),
                        })?;
                        if file.file_type().is_file() {
                            self.hash_file(file.path(), &mut hashes)?;
                        }
                    }
                } else if path.is_file() {
                    self.hash_file(&path, &mut hashes)?;
                }
            }
        }

        Ok(hashes)
    }

    fn hash_file(
        &self,
        path: &Path,
        hashes: &mut BTreeMap<String, String>,
    ) -> Result<(), FingerprintError> {
        let contents = fs::read(path).map_err(|source| FingerprintError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let hash = format!("{:x}", Sha256::digest(&contents));
        let relative = path
            .strip_prefix(&self.root_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        hashes.insert(relative, hash);
        Ok(())
    }
}

impl Fingerprinter for FileFingerprinter {
    #[instrument(skip_all, fields(task = %node.id))]
    fn capture(&self, node: &TaskNode) -> Result<Fingerprint, FingerprintError> {
        let definition = &node.definition;
        let fingerprint = Fingerprint {
            implementation: implementation_hash(definition),
            inputs: self.hash_patterns(&node.id.package, &definition.inputs, true)?,
            outputs: self.hash_patterns(&node.id.package, &definition.outputs, false)?,
        };
        debug!(
            inputs = fingerprint.inputs.len(),
            outputs = fingerprint.outputs.len(),
            "captured fingerprint"
        );
        Ok(fingerprint)
    }
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Fingerprinting errors
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    /// A declared (non-glob) input does not exist
    #[error("Declared input {0} does not exist")]
    MissingInput(PathBuf),

    /// A declared pattern is not a valid glob
    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// Reading a file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;
    use crate::dag::TaskDag;
    use crate::task::TaskId;
    use tempfile::TempDir;

    fn node_for(definition: TaskDefinition) -> TaskNode {
        let mut project = Project::new();
        let handle = project.register("pkg", definition).unwrap();
        let dag = TaskDag::build(&project, &[handle.id().clone()], &[]).unwrap();
        dag.get(handle.id()).unwrap().clone()
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn compile_task() -> TaskDefinition {
        TaskDefinition::new("compile")
            .with_command("cc")
            .with_inputs(vec!["src/*.c".to_string()])
            .with_outputs(vec!["build".to_string()])
    }

    #[test]
    fn test_capture_hashes_inputs_and_outputs() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/src/main.c", "int main() {}");
        write(temp.path(), "pkg/build/main.o", "obj");

        let fingerprinter = FileFingerprinter::new(temp.path());
        let fp = fingerprinter.capture(&node_for(compile_task())).unwrap();

        assert_eq!(fp.inputs.keys().collect::<Vec<_>>(), vec!["pkg/src/main.c"]);
        assert_eq!(fp.outputs.keys().collect::<Vec<_>>(), vec!["pkg/build/main.o"]);
    }

    #[test]
    fn test_capture_is_deterministic() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/src/a.c", "a");
        write(temp.path(), "pkg/src/b.c", "b");

        let fingerprinter = FileFingerprinter::new(temp.path());
        let node = node_for(compile_task());
        assert_eq!(
            fingerprinter.capture(&node).unwrap(),
            fingerprinter.capture(&node).unwrap()
        );
    }

    #[test]
    fn test_capture_detects_content_change() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "pkg/src/a.c", "a");
        let fingerprinter = FileFingerprinter::new(temp.path());
        let node = node_for(compile_task());

        let before = fingerprinter.capture(&node).unwrap();
        write(temp.path(), "pkg/src/a.c", "changed");
        let after = fingerprinter.capture(&node).unwrap();

        assert_ne!(before.inputs, after.inputs);
        assert_eq!(before.implementation, after.implementation);
    }

    #[test]
    fn test_missing_literal_input() {
        let temp = TempDir::new().unwrap();
        let fingerprinter = FileFingerprinter::new(temp.path());
        let node = node_for(
            TaskDefinition::new("package").with_inputs(vec!["manifest.json".to_string()]),
        );

        let err = fingerprinter.capture(&node).unwrap_err();
        assert!(matches!(err, FingerprintError::MissingInput(_)));
    }

    #[test]
    fn test_glob_without_matches_is_empty() {
        let temp = TempDir::new().unwrap();
        let fingerprinter = FileFingerprinter::new(temp.path());
        let fp = fingerprinter.capture(&node_for(compile_task())).unwrap();
        assert!(fp.inputs.is_empty());
        assert!(fp.outputs.is_empty());
    }

    #[test]
    fn test_implementation_hash_tracks_command_and_properties() {
        let base = TaskDefinition::new("compile").with_command("cc");
        let other_cmd = TaskDefinition::new("compile").with_command("clang");
        let with_prop = TaskDefinition::new("compile")
            .with_command("cc")
            .with_property("opt", "O2");

        assert_eq!(implementation_hash(&base), implementation_hash(&base.clone()));
        assert_ne!(implementation_hash(&base), implementation_hash(&other_cmd));
        assert_ne!(implementation_hash(&base), implementation_hash(&with_prop));
    }

    #[test]
    fn test_overlapping_outputs() {
        let current = Fingerprint {
            implementation: "impl".to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::from([
                ("pkg/build/a.o".to_string(), "h1".to_string()),
                ("pkg/build/b.o".to_string(), "h2".to_string()),
            ]),
        };

        assert_eq!(overlapping_outputs(&current, None).len(), 2);

        let prior = ExecutionState {
            task_id: TaskId::new("pkg", "compile"),
            implementation: "impl".to_string(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::from([("pkg/build/a.o".to_string(), "h1".to_string())]),
            cache_key: None,
            recorded_at: String::new(),
        };
        assert_eq!(overlapping_outputs(&current, Some(&prior)), vec!["pkg/build/b.o"]);
    }
}
