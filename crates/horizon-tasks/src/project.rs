//! Configuration-time task registry

use std::collections::BTreeMap;

use tracing::{debug, info, instrument};

use horizon_core::config::{gate_task_name, Config};

use crate::horizon::{GroupError, HorizonBuilder, HorizonGroup};
use crate::task::{Task, TaskDefinition, TaskHandle, TaskId, TaskRef};

/// All tasks and horizons declared for a workspace.
///
/// Dependency edges may point at tasks that are not registered yet; they are
/// checked when a run graph is built from the project.
#[derive(Debug, Clone, Default)]
pub struct Project {
    tasks: BTreeMap<TaskId, TaskDefinition>,
    edges: Vec<(TaskId, TaskId)>,
    horizons: Vec<HorizonGroup>,
}

impl Project {
    /// Create an empty project
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a project from configuration, declaring every package task and horizon
    #[instrument(skip_all, fields(packages = config.packages.len(), horizons = config.horizons.len()))]
    pub fn from_config(config: &Config) -> Result<Self, GroupError> {
        let mut project = Self::new();

        for (package, package_config) in &config.packages {
            for (name, task) in &package_config.tasks {
                let definition = TaskDefinition {
                    name: name.clone(),
                    command: task.command.clone(),
                    gate_for: None,
                    depends_on: task.depends_on.clone(),
                    outputs: task.outputs.clone(),
                    inputs: task.inputs.clone(),
                    env: task.env.clone(),
                    properties: task.properties.clone(),
                    cacheable: task.cacheable,
                };
                project.register(package, definition)?;
            }
        }

        for horizon_config in &config.horizons {
            let mut horizon =
                project.create_horizon(&horizon_config.package, &horizon_config.name)?;
            for member in &horizon_config.members {
                horizon.add_value(member)?;
            }

            let declares_io = !horizon_config.inputs.is_empty()
                || !horizon_config.outputs.is_empty()
                || horizon_config.command.is_some();
            if declares_io {
                horizon.configure_outputs(|task| {
                    task.inputs = horizon_config.inputs.clone();
                    task.outputs = horizon_config.outputs.clone();
                    task.command = horizon_config.command.clone();
                });
            }
        }

        info!(
            tasks = project.tasks.len(),
            horizons = project.horizons.len(),
            "project loaded"
        );
        Ok(project)
    }

    /// Register a task in a package and return a lazy handle to it
    pub fn register(
        &mut self,
        package: &str,
        definition: TaskDefinition,
    ) -> Result<TaskHandle, GroupError> {
        let id = TaskId::new(package, definition.name.clone());
        if self.tasks.contains_key(&id) {
            return Err(GroupError::DuplicateTask(id));
        }
        debug!(task = %id, "registered task");
        self.tasks.insert(id.clone(), definition);
        Ok(TaskHandle::new(id))
    }

    /// Reference a task by name without looking it up
    pub fn named(&self, name: &str) -> TaskRef {
        TaskRef::ByName(name.to_string())
    }

    /// Handle to a registered task
    pub fn handle(&self, id: &TaskId) -> Option<TaskHandle> {
        self.tasks.contains_key(id).then(|| TaskHandle::new(id.clone()))
    }

    /// Realize the task behind a handle
    pub fn realize(&self, handle: &TaskHandle) -> Option<Task> {
        self.tasks.get(handle.id()).map(|definition| Task {
            id: handle.id().clone(),
            definition: definition.clone(),
        })
    }

    /// Turn any task reference into a handle. Names are not validated here.
    pub fn resolve(&mut self, task: TaskRef, default_package: &str) -> TaskHandle {
        match task {
            TaskRef::ByName(name) => TaskHandle::new(TaskId::resolve(&name, default_package)),
            TaskRef::Lazy(handle) => handle,
            TaskRef::Realized(task) => {
                self.tasks
                    .entry(task.id.clone())
                    .or_insert(task.definition);
                TaskHandle::new(task.id)
            }
        }
    }

    /// Declare that `from` depends on `to`
    pub fn add_dependency(&mut self, from: &TaskHandle, to: &TaskHandle) {
        let edge = (from.id().clone(), to.id().clone());
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Direct dependencies of a task: its declared `depends_on` plus wired edges
    pub fn dependencies_of(&self, id: &TaskId) -> Vec<TaskId> {
        let mut deps: Vec<TaskId> = self
            .tasks
            .get(id)
            .map(|definition| {
                definition
                    .depends_on
                    .iter()
                    .map(|dep| TaskId::resolve(dep, &id.package))
                    .collect()
            })
            .unwrap_or_default();

        for (from, to) in &self.edges {
            if from == id && !deps.contains(to) {
                deps.push(to.clone());
            }
        }
        deps
    }

    /// Definition of a registered task
    pub fn task(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.tasks.get(id)
    }

    pub(crate) fn task_mut(&mut self, id: &TaskId) -> Option<&mut TaskDefinition> {
        self.tasks.get_mut(id)
    }

    /// All registered tasks
    pub fn tasks(&self) -> impl Iterator<Item = (&TaskId, &TaskDefinition)> {
        self.tasks.iter()
    }

    /// Create a horizon: registers `<name>` and `<name>IsCached` in `package`,
    /// with the representative depending on the gate
    pub fn create_horizon(
        &mut self,
        package: &str,
        name: &str,
    ) -> Result<HorizonBuilder<'_>, GroupError> {
        if self.horizons.iter().any(|h| h.name() == name) {
            return Err(GroupError::DuplicateHorizon(name.to_string()));
        }
        let group = HorizonGroup::new(package, name);
        for handle in [group.representative(), group.gate()] {
            if self.tasks.contains_key(handle.id()) {
                return Err(GroupError::DuplicateTask(handle.id().clone()));
            }
        }

        self.register(package, TaskDefinition::new(name))?;
        let gate = TaskDefinition {
            gate_for: Some(name.to_string()),
            ..TaskDefinition::new(gate_task_name(name))
        };
        self.register(package, gate)?;
        // Schedules the gate even before any member is added
        self.add_dependency(group.representative(), group.gate());

        info!(horizon = %name, package, "created horizon");
        self.horizons.push(group);
        let index = self.horizons.len() - 1;
        Ok(HorizonBuilder::new(self, index))
    }

    /// Create a horizon and configure it in one step
    pub fn horizon_named(
        &mut self,
        package: &str,
        name: &str,
        configure: impl FnOnce(&mut HorizonBuilder<'_>),
    ) -> Result<HorizonGroup, GroupError> {
        let mut horizon = self.create_horizon(package, name)?;
        configure(&mut horizon);
        Ok(horizon.group().clone())
    }

    /// Reopen a declared horizon for further configuration
    pub fn horizon_mut(&mut self, name: &str) -> Result<HorizonBuilder<'_>, GroupError> {
        let index = self
            .horizon_index(name)
            .ok_or_else(|| GroupError::UnknownHorizon(name.to_string()))?;
        Ok(HorizonBuilder::new(self, index))
    }

    /// Look up a horizon by name ("name" or "package:name")
    pub fn horizon(&self, name: &str) -> Option<&HorizonGroup> {
        self.horizon_index(name).map(|i| &self.horizons[i])
    }

    /// All declared horizons
    pub fn horizons(&self) -> &[HorizonGroup] {
        &self.horizons
    }

    pub(crate) fn horizon_at_mut(&mut self, index: usize) -> &mut HorizonGroup {
        &mut self.horizons[index]
    }

    fn horizon_index(&self, name: &str) -> Option<usize> {
        match TaskId::parse(name) {
            Some(id) => self
                .horizons
                .iter()
                .position(|h| h.representative().id() == &id),
            None => self.horizons.iter().position(|h| h.name() == name),
        }
    }
}
