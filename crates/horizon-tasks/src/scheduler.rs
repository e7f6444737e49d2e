//! Task scheduler: async wave executor using tokio

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::{CacheStore, CapturedOutput};
use crate::dag::{TaskDag, TaskNode};
use crate::fingerprint::{FileFingerprinter, Fingerprinter};
use crate::gate::{self, GateDecision};
use crate::history::{ExecutionState, FileHistory, HistoryRecorder};
use crate::pipeline::{self, CachingState, Resolution};
use crate::probe::Probe;
use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::{TaskCommand, TaskId};

/// Result of a single task execution
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that was executed
    pub id: TaskId,
    /// How the task ended
    pub status: TaskStatus,
    /// How long the task took
    pub duration: Duration,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// When the scheduler picked the task up
    pub started_at: Instant,
    /// When the task finished
    pub finished_at: Instant,
}

impl TaskResult {
    fn immediate(id: TaskId, status: TaskStatus) -> Self {
        let now = Instant::now();
        Self {
            id,
            status,
            duration: Duration::ZERO,
            stdout: String::new(),
            stderr: String::new(),
            started_at: now,
            finished_at: now,
        }
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task completed successfully
    Success,
    /// Outputs were restored from the cache
    CacheHit,
    /// Outputs already matched the last execution
    UpToDate,
    /// Task failed
    Failed(String),
    /// Task was skipped
    Skipped,
    /// Task was disabled by a horizon gate
    Disabled,
}

impl TaskStatus {
    /// Check if this status represents success
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::CacheHit | Self::UpToDate | Self::Disabled
        )
    }
}

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrent tasks
    pub concurrency: usize,
    /// Whether to continue on error
    pub continue_on_error: bool,
    /// Whether to use cache
    pub use_cache: bool,
    /// Whether this is a dry run
    pub dry_run: bool,
    /// Working directory root
    pub root_dir: PathBuf,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus(),
            continue_on_error: false,
            use_cache: true,
            dry_run: false,
            root_dir: std::env::current_dir().unwrap_or_default(),
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Shared state handed to every spawned task
#[derive(Clone)]
struct RunContext {
    root_dir: PathBuf,
    dry_run: bool,
    history: Arc<dyn HistoryRecorder>,
    cache: Option<Arc<dyn CacheStore>>,
    fingerprinter: Arc<dyn Fingerprinter>,
    reporter: Arc<dyn TaskReporter>,
}

impl RunContext {
    fn cache(&self) -> Option<&dyn CacheStore> {
        self.cache.as_deref()
    }
}

/// Task scheduler: executes a DAG of tasks with parallelism
pub struct TaskScheduler {
    options: SchedulerOptions,
    context: RunContext,
}

impl TaskScheduler {
    /// Create a new scheduler with file-backed history and fingerprinting under the root
    pub fn new(
        options: SchedulerOptions,
        cache: Option<Arc<dyn CacheStore>>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        let context = RunContext {
            root_dir: options.root_dir.clone(),
            dry_run: options.dry_run,
            history: Arc::new(FileHistory::default_dir(&options.root_dir)),
            cache: if options.use_cache { cache } else { None },
            fingerprinter: Arc::new(FileFingerprinter::new(&options.root_dir)),
            reporter,
        };
        Self { options, context }
    }

    /// Replace the execution history store
    pub fn with_history(mut self, history: Arc<dyn HistoryRecorder>) -> Self {
        self.context.history = history;
        self
    }

    /// Replace the fingerprinter
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.context.fingerprinter = fingerprinter;
        self
    }

    /// Execute all tasks in the DAG
    pub async fn execute(&self, dag: &TaskDag) -> Vec<TaskResult> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let reporter = &self.context.reporter;
        let mut all_results: HashMap<TaskId, TaskResult> = HashMap::new();
        let mut failed = false;

        for (wave_idx, wave) in dag.waves().iter().enumerate() {
            if failed && !self.options.continue_on_error {
                for id in wave {
                    all_results.insert(
                        id.clone(),
                        TaskResult::immediate(id.clone(), TaskStatus::Skipped),
                    );
                }
                continue;
            }

            reporter.report(&TaskEvent::WaveStarted {
                wave: wave_idx,
                task_count: wave.len(),
            });

            // Gates finish before anything else in the wave is spawned
            let mut pending = Vec::new();
            for task_id in wave {
                let Some(node) = dag.get(task_id) else {
                    continue;
                };
                if !node.is_enabled() {
                    reporter.report(&TaskEvent::Disabled { id: task_id.clone() });
                    all_results.insert(
                        task_id.clone(),
                        TaskResult::immediate(task_id.clone(), TaskStatus::Disabled),
                    );
                } else if node.definition.gate_for.is_some() {
                    all_results.insert(task_id.clone(), self.evaluate_gate(node, dag));
                } else {
                    pending.push(node);
                }
            }

            let mut handles = Vec::new();
            for node in pending {
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let id = node.id.clone();
                let node = node.clone();
                let context = self.context.clone();

                let handle = tokio::spawn(async move {
                    let result = execute_task(&node, &context).await;
                    drop(permit);
                    result
                });

                handles.push((id, handle));
            }

            // Collect results from this wave
            for (id, handle) in handles {
                match handle.await {
                    Ok(result) => {
                        if matches!(result.status, TaskStatus::Failed(_)) {
                            failed = true;
                        }
                        all_results.insert(result.id.clone(), result);
                    }
                    Err(e) => {
                        failed = true;
                        all_results.insert(
                            id.clone(),
                            TaskResult::immediate(
                                id,
                                TaskStatus::Failed(format!("Task panicked: {}", e)),
                            ),
                        );
                    }
                }
            }
        }

        let count = |f: fn(&TaskStatus) -> bool| all_results.values().filter(|r| f(&r.status)).count();
        reporter.report(&TaskEvent::AllCompleted {
            total: all_results.len(),
            succeeded: count(TaskStatus::is_success),
            failed: count(|s| matches!(s, TaskStatus::Failed(_))),
            cached: count(|s| matches!(s, TaskStatus::CacheHit)),
            up_to_date: count(|s| matches!(s, TaskStatus::UpToDate)),
            disabled: count(|s| matches!(s, TaskStatus::Disabled)),
            duration: start.elapsed(),
        });

        // Return results in topological order
        dag.sorted()
            .iter()
            .filter_map(|id| all_results.remove(id))
            .collect()
    }

    /// Run a gate task: probe its horizon's representative and disable members
    fn evaluate_gate(&self, node: &TaskNode, dag: &TaskDag) -> TaskResult {
        let started_at = Instant::now();
        let reporter = &self.context.reporter;
        reporter.report(&TaskEvent::Started {
            id: node.id.clone(),
            command: format!("<gate:{}>", node.definition.gate_for.as_deref().unwrap_or_default()),
        });

        match dag.horizon_for_gate(&node.id) {
            Some(group) => {
                let probe = Probe::new(
                    &*self.context.history,
                    self.context.cache(),
                    &*self.context.fingerprinter,
                );
                let decision = gate::execute(group, dag, &probe);
                reporter.report(&TaskEvent::GateEvaluated {
                    horizon: group.name().to_string(),
                    outcome: decision.outcome().map(|o| o.kind()),
                    disabled: decision.disabled_members().len(),
                });
                if let GateDecision::Proceed { outcome } = &decision {
                    debug!(gate = %node.id, outcome = %outcome, "gate leaves members enabled");
                }
            }
            None => warn!(gate = %node.id, "gate task has no horizon in this run"),
        }

        let finished_at = Instant::now();
        let duration = finished_at - started_at;
        reporter.report(&TaskEvent::Completed {
            id: node.id.clone(),
            duration,
            cached: false,
            up_to_date: false,
        });
        TaskResult {
            id: node.id.clone(),
            status: TaskStatus::Success,
            duration,
            stdout: String::new(),
            stderr: String::new(),
            started_at,
            finished_at,
        }
    }
}

/// Execute a single task
async fn execute_task(node: &TaskNode, context: &RunContext) -> TaskResult {
    let started_at = Instant::now();
    let id = &node.id;
    let reporter = &*context.reporter;
    let command = node.definition.effective_command();
    let cmd_str = match &command {
        TaskCommand::Shell(s) => s.clone(),
        TaskCommand::Gate { horizon } => format!("<gate:{}>", horizon),
        TaskCommand::Lifecycle => "<lifecycle>".to_string(),
    };

    reporter.report(&TaskEvent::Started {
        id: id.clone(),
        command: cmd_str,
    });

    let finish = |status: TaskStatus, stdout: String, stderr: String| {
        let finished_at = Instant::now();
        TaskResult {
            id: id.clone(),
            status,
            duration: finished_at - started_at,
            stdout,
            stderr,
            started_at,
            finished_at,
        }
    };

    let resolution = match pipeline::resolve(
        node,
        &*context.history,
        context.cache(),
        &*context.fingerprinter,
    ) {
        Ok(resolution) => Some(resolution),
        Err(e) => {
            warn!(task = %id, error = %e, "could not resolve caching state, executing without history");
            None
        }
    };

    if let Some(resolution) = &resolution {
        match &resolution.state {
            // A cached result whose outputs are already on disk needs no restore
            CachingState::UpToDate | CachingState::FromCache(_) if resolution.outputs_current => {
                let result = finish(TaskStatus::UpToDate, String::new(), String::new());
                reporter.report(&TaskEvent::Completed {
                    id: id.clone(),
                    duration: result.duration,
                    cached: false,
                    up_to_date: true,
                });
                return result;
            }
            CachingState::FromCache(entry) if !context.dry_run => {
                if let Some(cache) = context.cache() {
                    match cache.restore(entry, &context.root_dir) {
                        Ok(()) => {
                            let state = ExecutionState::after_execution(
                                id.clone(),
                                &resolution.fingerprint,
                                entry.outputs.clone(),
                                Some(entry.key.clone()),
                            );
                            if let Err(e) = context.history.record(&state) {
                                warn!(task = %id, error = %e, "failed to record execution history");
                            }
                            let result =
                                finish(TaskStatus::CacheHit, entry.stdout.clone(), entry.stderr.clone());
                            reporter.report(&TaskEvent::Completed {
                                id: id.clone(),
                                duration: result.duration,
                                cached: true,
                                up_to_date: false,
                            });
                            return result;
                        }
                        Err(e) => {
                            warn!(task = %id, error = %e, "failed to restore cached outputs, executing");
                        }
                    }
                }
            }
            CachingState::UpToDate | CachingState::FromCache(_) | CachingState::Execute { .. } => {}
        }
    }

    // Dry run: don't actually execute
    if context.dry_run {
        reporter.report(&TaskEvent::Skipped {
            id: id.clone(),
            reason: "dry run".to_string(),
        });
        return finish(TaskStatus::Skipped, String::new(), String::new());
    }

    let outcome = match command {
        TaskCommand::Shell(ref cmd) => {
            let dir = working_dir(&context.root_dir, &id.package);
            run_shell_command(id, cmd, &dir, reporter).await
        }
        TaskCommand::Lifecycle | TaskCommand::Gate { .. } => Ok((String::new(), String::new())),
    };

    match outcome {
        Ok((stdout, stderr)) => {
            let result = finish(TaskStatus::Success, stdout, stderr);
            if let Some(resolution) = &resolution {
                record_execution(node, resolution, &result, context);
            }
            reporter.report(&TaskEvent::Completed {
                id: id.clone(),
                duration: result.duration,
                cached: false,
                up_to_date: false,
            });
            result
        }
        Err(e) => {
            let result = finish(TaskStatus::Failed(e.clone()), String::new(), String::new());
            reporter.report(&TaskEvent::Failed {
                id: id.clone(),
                duration: result.duration,
                error: e,
            });
            result
        }
    }
}

/// Record history for a genuine execution and store cacheable results
fn record_execution(
    node: &TaskNode,
    resolution: &Resolution,
    result: &TaskResult,
    context: &RunContext,
) {
    let after = match context.fingerprinter.capture(node) {
        Ok(after) => after,
        Err(e) => {
            warn!(task = %node.id, error = %e, "failed to fingerprint outputs, history not recorded");
            return;
        }
    };

    let mut stored_key = None;
    if let (Some(cache), Some(key)) = (context.cache(), resolution.cache_key.as_ref()) {
        let captured = CapturedOutput {
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            duration: result.duration,
        };
        match cache.store(key, &node.id, &after.outputs, &context.root_dir, &captured) {
            Ok(_) => stored_key = Some(key.clone()),
            Err(e) => warn!(task = %node.id, error = %e, "failed to store result in cache"),
        }
    }

    let state = ExecutionState::after_execution(
        node.id.clone(),
        &resolution.fingerprint,
        after.outputs,
        stored_key,
    );
    if let Err(e) = context.history.record(&state) {
        warn!(task = %node.id, error = %e, "failed to record execution history");
    }
}

/// Shell commands run in the package directory when it exists
fn working_dir(root_dir: &Path, package: &str) -> PathBuf {
    let package_dir = root_dir.join(package);
    if package_dir.is_dir() {
        package_dir
    } else {
        root_dir.to_path_buf()
    }
}

/// Read a child pipe to EOF, reporting each line
async fn drain_lines<R>(
    pipe: Option<R>,
    id: &TaskId,
    is_stderr: bool,
    reporter: &dyn TaskReporter,
) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let Some(pipe) = pipe else {
        return collected;
    };
    let mut lines = BufReader::new(pipe).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        reporter.report(&TaskEvent::Output {
            id: id.clone(),
            line: line.clone(),
            is_stderr,
        });
        collected.push(line);
    }
    collected
}

/// Run a shell command and capture output
async fn run_shell_command(
    id: &TaskId,
    cmd: &str,
    dir: &Path,
    reporter: &dyn TaskReporter,
) -> Result<(String, String), String> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| format!("Failed to spawn: {}", e))?;

    // Both pipes drain together so a chatty stream cannot stall the child
    let (stdout_lines, stderr_lines) = tokio::join!(
        drain_lines(child.stdout.take(), id, false, reporter),
        drain_lines(child.stderr.take(), id, true, reporter),
    );

    let status = child
        .wait()
        .await
        .map_err(|e| format!("Failed to wait: {}", e))?;

    if status.success() {
        Ok((stdout_lines.join("\n"), stderr_lines.join("\n")))
    } else {
        let code = status.code().unwrap_or(-1);
        Err(format!(
            "Command exited with code {}: {}",
            code,
            stderr_lines.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::cache::TaskCache;
    use crate::horizon::HorizonGroup;
    use crate::outcome::OutcomeKind;
    use crate::project::Project;
    use crate::reporter::CollectingReporter;
    use crate::task::TaskDefinition;
    use tempfile::TempDir;

    fn horizon_project(representative_inputs: Vec<String>) -> (Project, HorizonGroup) {
        let mut project = Project::new();
        for (name, file) in [("compileA", "a"), ("compileB", "b"), ("compileC", "c")] {
            project
                .register(
                    "app",
                    TaskDefinition::new(name)
                        .with_command(format!("mkdir -p build && echo {0} > build/{0}.o", file)),
                )
                .unwrap();
        }
        let group = project
            .horizon_named("app", "assemble", |horizon| {
                horizon
                    .add_all(["compileA", "compileB", "compileC"])
                    .configure_outputs(|task| {
                        task.outputs = vec!["build/*.o".to_string()];
                        task.inputs = representative_inputs;
                    });
            })
            .unwrap();
        (project, group)
    }

    fn workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/src")).unwrap();
        fs::write(temp.path().join("app/src/main.c"), "int main() {}").unwrap();
        temp
    }

    async fn run(
        root: &Path,
        project: &Project,
        targets: &[TaskId],
        dry_run: bool,
    ) -> (Vec<TaskResult>, Arc<CollectingReporter>) {
        let dag = TaskDag::build(project, targets, &[]).unwrap();
        let reporter = Arc::new(CollectingReporter::default());
        let options = SchedulerOptions {
            concurrency: 2,
            dry_run,
            root_dir: root.to_path_buf(),
            ..Default::default()
        };
        let cache: Arc<dyn CacheStore> = Arc::new(TaskCache::default_dir(root));
        let scheduler = TaskScheduler::new(options, Some(cache), reporter.clone());
        (scheduler.execute(&dag).await, reporter)
    }

    fn status_of<'r>(results: &'r [TaskResult], group: &HorizonGroup, task: &str) -> &'r TaskStatus {
        let id = TaskId::new(group.package(), task);
        &results.iter().find(|r| r.id == id).unwrap().status
    }

    fn members(group: &HorizonGroup) -> Vec<TaskId> {
        group.members().iter().map(|m| m.id().clone()).collect()
    }

    #[test]
    fn test_task_status_is_success() {
        assert!(TaskStatus::Success.is_success());
        assert!(TaskStatus::CacheHit.is_success());
        assert!(TaskStatus::UpToDate.is_success());
        assert!(TaskStatus::Disabled.is_success());
        assert!(!TaskStatus::Failed("error".to_string()).is_success());
        assert!(!TaskStatus::Skipped.is_success());
    }

    #[test]
    fn test_scheduler_options_default() {
        let opts = SchedulerOptions::default();
        assert!(opts.concurrency > 0);
        assert!(!opts.continue_on_error);
        assert!(opts.use_cache);
        assert!(!opts.dry_run);
    }

    #[tokio::test]
    async fn test_up_to_date_horizon_disables_members() {
        let temp = workspace();
        let (project, group) = horizon_project(vec![]);
        let target = [group.representative().id().clone()];

        let (first, _) = run(temp.path(), &project, &target, false).await;
        assert!(first.iter().all(|r| r.status.is_success()), "{:?}", first);
        assert_eq!(status_of(&first, &group, "compileA"), &TaskStatus::Success);

        let (second, reporter) = run(temp.path(), &project, &target, false).await;
        assert_eq!(status_of(&second, &group, "assemble"), &TaskStatus::UpToDate);
        for member in ["compileA", "compileB", "compileC"] {
            assert_eq!(status_of(&second, &group, member), &TaskStatus::Disabled);
        }
        let started = reporter.started();
        assert!(members(&group).iter().all(|m| !started.contains(m)));
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            TaskEvent::GateEvaluated {
                outcome: Some(OutcomeKind::FromCache),
                disabled: 3,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_cached_horizon_restores_and_disables_members() {
        let temp = workspace();
        let (project, group) = horizon_project(vec![]);
        let target = [group.representative().id().clone()];
        run(temp.path(), &project, &target, false).await;

        // Fresh checkout with a warm cache
        fs::remove_dir_all(temp.path().join("app/build")).unwrap();
        fs::remove_dir_all(temp.path().join(".horizon/history")).unwrap();

        let (results, reporter) = run(temp.path(), &project, &target, false).await;
        assert_eq!(status_of(&results, &group, "assemble"), &TaskStatus::CacheHit);
        for member in ["compileA", "compileB", "compileC"] {
            assert_eq!(status_of(&results, &group, member), &TaskStatus::Disabled);
        }
        assert!(reporter.events().iter().any(|e| matches!(
            e,
            TaskEvent::GateEvaluated { disabled: 3, .. }
        )));
        assert_eq!(
            fs::read_to_string(temp.path().join("app/build/a.o")).unwrap(),
            "a\n"
        );
    }

    #[tokio::test]
    async fn test_changed_input_runs_members_after_gate() {
        let temp = workspace();
        let (project, group) = horizon_project(vec!["src/*.c".to_string()]);
        let target = [group.representative().id().clone()];
        run(temp.path(), &project, &target, false).await;

        fs::write(temp.path().join("app/src/main.c"), "int main() { return 1; }").unwrap();

        let (results, reporter) = run(temp.path(), &project, &target, false).await;
        let started = reporter.started();
        for member in members(&group) {
            assert!(started.contains(&member), "{} should have run", member);
        }
        assert_eq!(status_of(&results, &group, "assemble"), &TaskStatus::Success);

        let gate = results
            .iter()
            .find(|r| &r.id == group.gate().id())
            .unwrap();
        for member in members(&group) {
            let result = results.iter().find(|r| r.id == member).unwrap();
            assert!(gate.finished_at <= result.started_at);
        }
    }

    #[tokio::test]
    async fn test_independent_horizons_gate_separately() {
        let temp = workspace();
        fs::create_dir_all(temp.path().join("app/assets")).unwrap();
        fs::write(temp.path().join("app/assets/logo.txt"), "v1").unwrap();

        let mut project = Project::new();
        for (name, command) in [
            ("compileA", "mkdir -p build && echo a > build/a.o"),
            ("compileB", "mkdir -p build && echo b > build/b.o"),
            ("bundleA", "mkdir -p dist && cat assets/logo.txt > dist/a.js"),
            ("bundleB", "mkdir -p dist && cat assets/logo.txt > dist/b.js"),
        ] {
            project
                .register("app", TaskDefinition::new(name).with_command(command))
                .unwrap();
        }
        let assemble = project
            .horizon_named("app", "assemble", |horizon| {
                horizon
                    .add_all(["compileA", "compileB"])
                    .configure_outputs(|task| task.outputs = vec!["build/*.o".to_string()]);
            })
            .unwrap();
        let bundle = project
            .horizon_named("app", "bundle", |horizon| {
                horizon.add_all(["bundleA", "bundleB"]).configure_outputs(|task| {
                    task.outputs = vec!["dist/*.js".to_string()];
                    task.inputs = vec!["assets/*.txt".to_string()];
                });
            })
            .unwrap();
        let targets = [
            assemble.representative().id().clone(),
            bundle.representative().id().clone(),
        ];

        let (first, _) = run(temp.path(), &project, &targets, false).await;
        assert!(first.iter().all(|r| r.status.is_success()), "{:?}", first);

        fs::write(temp.path().join("app/assets/logo.txt"), "v2").unwrap();
        let (results, reporter) = run(temp.path(), &project, &targets, false).await;

        for member in members(&assemble) {
            let result = results.iter().find(|r| r.id == member).unwrap();
            assert_eq!(result.status, TaskStatus::Disabled);
        }
        let started = reporter.started();
        let gate = results.iter().find(|r| &r.id == bundle.gate().id()).unwrap();
        for member in members(&bundle) {
            let result = results.iter().find(|r| r.id == member).unwrap();
            assert_eq!(result.status, TaskStatus::Success);
            assert!(started.contains(&member));
            assert!(gate.finished_at <= result.started_at);
        }
        let assemble_gate = results
            .iter()
            .find(|r| &r.id == assemble.gate().id())
            .unwrap();
        for member in members(&assemble) {
            let result = results.iter().find(|r| r.id == member).unwrap();
            assert!(assemble_gate.finished_at <= result.started_at);
        }
        assert_eq!(
            fs::read_to_string(temp.path().join("app/dist/a.js")).unwrap(),
            "v2"
        );
    }

    #[tokio::test]
    async fn test_deselected_representative_gates_nothing() {
        let temp = workspace();
        let (project, group) = horizon_project(vec![]);
        let representative = [group.representative().id().clone()];
        run(temp.path(), &project, &representative, false).await;

        let (results, _) = run(temp.path(), &project, &[TaskId::new("app", "compileA")], false).await;
        assert_eq!(results.len(), 2);
        assert_eq!(status_of(&results, &group, "compileA"), &TaskStatus::Success);
        assert!(results.iter().all(|r| r.status != TaskStatus::Disabled));
    }

    #[tokio::test]
    async fn test_execute_dry_run() {
        let temp = workspace();
        let (project, group) = horizon_project(vec![]);
        let target = [group.representative().id().clone()];

        let (results, _) = run(temp.path(), &project, &target, true).await;
        assert_eq!(results.len(), 5);
        assert_eq!(status_of(&results, &group, "compileA"), &TaskStatus::Skipped);
        assert!(!temp.path().join("app/build").exists());
        assert!(!temp.path().join(".horizon/history").exists());
    }

    #[tokio::test]
    async fn test_large_stderr_does_not_stall_task() {
        let temp = workspace();
        let mut project = Project::new();
        project
            .register(
                "app",
                TaskDefinition::new("noisy")
                    .with_command("head -c 200000 /dev/zero | tr '\\0' x >&2; echo done"),
            )
            .unwrap();

        let (results, _) = tokio::time::timeout(
            Duration::from_secs(30),
            run(temp.path(), &project, &[TaskId::new("app", "noisy")], false),
        )
        .await
        .expect("task with 200KB of stderr should finish");

        assert_eq!(results[0].status, TaskStatus::Success);
        assert_eq!(results[0].stdout, "done");
        assert_eq!(results[0].stderr.len(), 200_000);
    }

    #[tokio::test]
    async fn test_failure_skips_later_waves() {
        let temp = workspace();
        let mut project = Project::new();
        project
            .register("app", TaskDefinition::new("broken").with_command("exit 3"))
            .unwrap();
        project
            .register(
                "app",
                TaskDefinition::new("package")
                    .with_command("true")
                    .with_depends_on("broken"),
            )
            .unwrap();

        let (results, _) = run(temp.path(), &project, &[TaskId::new("app", "package")], false).await;
        assert!(matches!(results[0].status, TaskStatus::Failed(_)));
        assert_eq!(results[1].status, TaskStatus::Skipped);
    }
}
