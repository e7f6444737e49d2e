//! Run graph construction and management

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::horizon::HorizonGroup;
use crate::project::Project;
use crate::task::{TaskCommand, TaskDefinition, TaskId};

/// A node in the run graph
///
/// Clones share the `enabled` flag, so a node handed to a worker observes
/// a disable issued through the graph.
#[derive(Debug, Clone)]
pub struct TaskNode {
    /// Task identifier
    pub id: TaskId,
    /// The task definition
    pub definition: TaskDefinition,
    /// Tasks that must complete before this one
    pub dependencies: HashSet<TaskId>,
    /// Tasks waiting on this one
    pub dependents: HashSet<TaskId>,
    /// Execution wave (tasks in the same wave can run in parallel)
    pub wave: usize,
    enabled: Arc<AtomicBool>,
}

impl TaskNode {
    fn new(id: TaskId, definition: TaskDefinition) -> Self {
        Self {
            id,
            definition,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            wave: 0,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the scheduler should run this task
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Enable or disable the task for this run
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Directed acyclic graph of the tasks scheduled for one run
#[derive(Debug, Clone)]
pub struct TaskDag {
    /// All nodes in the DAG
    nodes: HashMap<TaskId, TaskNode>,
    /// Tasks grouped by execution wave (wave 0 runs first, then wave 1, etc.)
    waves: Vec<Vec<TaskId>>,
    /// Topologically sorted task order
    sorted_order: Vec<TaskId>,
    /// Horizons whose gate is scheduled, keyed by gate task
    horizons: HashMap<TaskId, HorizonGroup>,
}

impl TaskDag {
    /// Resolve requested task names against a project.
    ///
    /// A qualified name ("package:task") selects exactly that task; a bare name
    /// selects the task of that name in every package.
    pub fn select(project: &Project, names: &[String]) -> Result<Vec<TaskId>, DagError> {
        let mut selected = Vec::new();
        for name in names {
            let matches: Vec<TaskId> = match TaskId::parse(name) {
                Some(id) => project.task(&id).map(|_| id).into_iter().collect(),
                None => project
                    .tasks()
                    .filter(|(id, _)| &id.task_name == name)
                    .map(|(id, _)| id.clone())
                    .collect(),
            };
            if matches.is_empty() {
                return Err(DagError::TaskNotFound(name.clone()));
            }
            for id in matches {
                if !selected.contains(&id) {
                    selected.push(id);
                }
            }
        }
        Ok(selected)
    }

    /// Build the run graph for `targets` and everything they depend on.
    ///
    /// Excluded tasks are left out together with the edges leading through them,
    /// so their own dependencies are only scheduled when something else needs them.
    #[instrument(skip_all, fields(targets = targets.len(), excluded = excluded.len()))]
    pub fn build(
        project: &Project,
        targets: &[TaskId],
        excluded: &[TaskId],
    ) -> Result<Self, DagError> {
        let mut nodes: HashMap<TaskId, TaskNode> = HashMap::new();
        let mut queue: VecDeque<TaskId> = targets
            .iter()
            .filter(|id| !excluded.contains(id))
            .cloned()
            .collect();

        while let Some(id) = queue.pop_front() {
            if nodes.contains_key(&id) {
                continue;
            }
            let definition = project
                .task(&id)
                .ok_or_else(|| DagError::TaskNotFound(id.to_string()))?;

            let mut node = TaskNode::new(id.clone(), definition.clone());
            for dep in project.dependencies_of(&id) {
                if excluded.contains(&dep) {
                    debug!(task = %id, dependency = %dep, "dependency excluded from run");
                    continue;
                }
                node.dependencies.insert(dep.clone());
                queue.push_back(dep);
            }
            nodes.insert(id, node);
        }

        // Build reverse dependency map (dependents)
        let all_deps: Vec<(TaskId, HashSet<TaskId>)> = nodes
            .iter()
            .map(|(id, node)| (id.clone(), node.dependencies.clone()))
            .collect();

        for (id, deps) in &all_deps {
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.insert(id.clone());
                }
            }
        }

        let sorted_order = Self::topological_sort(&nodes)?;
        let waves = Self::compute_waves(&nodes, &sorted_order);

        for (wave_idx, wave_tasks) in waves.iter().enumerate() {
            for task_id in wave_tasks {
                if let Some(node) = nodes.get_mut(task_id) {
                    node.wave = wave_idx;
                }
            }
        }

        let horizons: HashMap<TaskId, HorizonGroup> = project
            .horizons()
            .iter()
            .filter(|group| nodes.contains_key(group.gate().id()))
            .map(|group| (group.gate().id().clone(), group.clone()))
            .collect();

        info!(
            task_count = nodes.len(),
            wave_count = waves.len(),
            horizon_count = horizons.len(),
            "task DAG built"
        );

        Ok(Self {
            nodes,
            waves,
            sorted_order,
            horizons,
        })
    }

    /// Topological sort using Kahn's algorithm
    #[instrument(skip_all, fields(node_count = nodes.len()))]
    fn topological_sort(nodes: &HashMap<TaskId, TaskNode>) -> Result<Vec<TaskId>, DagError> {
        let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
        let mut queue: VecDeque<TaskId> = VecDeque::new();
        let mut sorted: Vec<TaskId> = Vec::new();

        let mut roots: Vec<&TaskId> = Vec::new();
        for (id, node) in nodes {
            let degree = node
                .dependencies
                .iter()
                .filter(|d| nodes.contains_key(*d))
                .count();
            in_degree.insert(id.clone(), degree);
            if degree == 0 {
                roots.push(id);
            }
        }
        roots.sort();
        queue.extend(roots.into_iter().cloned());

        while let Some(id) = queue.pop_front() {
            sorted.push(id.clone());

            if let Some(node) = nodes.get(&id) {
                let mut dependents: Vec<&TaskId> = node.dependents.iter().collect();
                dependents.sort();
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        if sorted.len() != nodes.len() {
            let in_sorted: HashSet<_> = sorted.iter().collect();
            let mut cyclic: Vec<String> = nodes
                .keys()
                .filter(|id| !in_sorted.contains(id))
                .map(|id| id.to_string())
                .collect();
            cyclic.sort();
            return Err(DagError::CyclicDependency(cyclic.join(", ")));
        }

        Ok(sorted)
    }

    /// Compute execution waves (groups of tasks that can run in parallel)
    #[instrument(skip_all, fields(node_count = nodes.len()))]
    fn compute_waves(nodes: &HashMap<TaskId, TaskNode>, sorted: &[TaskId]) -> Vec<Vec<TaskId>> {
        let mut wave_map: HashMap<TaskId, usize> = HashMap::new();

        for id in sorted {
            if let Some(node) = nodes.get(id) {
                let wave = node
                    .dependencies
                    .iter()
                    .filter_map(|dep| wave_map.get(dep))
                    .max()
                    .map(|w| w + 1)
                    .unwrap_or(0);
                wave_map.insert(id.clone(), wave);
            }
        }

        if wave_map.is_empty() {
            return Vec::new();
        }

        let max_wave = wave_map.values().max().copied().unwrap_or(0);
        let mut waves: Vec<Vec<TaskId>> = vec![Vec::new(); max_wave + 1];

        for id in sorted {
            if let Some(&wave) = wave_map.get(id) {
                waves[wave].push(id.clone());
            }
        }

        waves
    }

    /// Get all task nodes
    pub fn nodes(&self) -> &HashMap<TaskId, TaskNode> {
        &self.nodes
    }

    /// Get a specific task node
    pub fn get(&self, id: &TaskId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    /// Get execution waves
    pub fn waves(&self) -> &[Vec<TaskId>] {
        &self.waves
    }

    /// Get the total number of tasks
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the DAG is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get topologically sorted order
    pub fn sorted(&self) -> &[TaskId] {
        &self.sorted_order
    }

    /// The horizon evaluated by a scheduled gate task
    pub fn horizon_for_gate(&self, gate: &TaskId) -> Option<&HorizonGroup> {
        self.horizons.get(gate)
    }

    /// Get a human-readable summary of the execution plan
    pub fn execution_plan(&self) -> String {
        let mut plan = String::new();
        for (i, wave) in self.waves.iter().enumerate() {
            plan.push_str(&format!("Wave {} ({} tasks):\n", i, wave.len()));
            for id in wave {
                if let Some(node) = self.nodes.get(id) {
                    let action = match node.definition.effective_command() {
                        TaskCommand::Shell(cmd) => cmd,
                        TaskCommand::Gate { horizon } => format!("<gate:{}>", horizon),
                        TaskCommand::Lifecycle => "<lifecycle>".to_string(),
                    };
                    let mut deps: Vec<String> =
                        node.dependencies.iter().map(|d| d.to_string()).collect();
                    deps.sort();
                    if deps.is_empty() {
                        plan.push_str(&format!("  {} -> {}\n", id, action));
                    } else {
                        plan.push_str(&format!(
                            "  {} -> {} (after: {})\n",
                            id,
                            action,
                            deps.join(", ")
                        ));
                    }
                }
            }
        }
        plan
    }
}

/// Errors during DAG construction
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// Cyclic dependency detected
    #[error("Cyclic dependency detected among tasks: {0}")]
    CyclicDependency(String),

    /// Task not found in the project
    #[error("Task '{0}' not found")]
    TaskNotFound(String),
}
