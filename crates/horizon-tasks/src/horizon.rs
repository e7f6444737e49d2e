//! Horizon groups: one representative task, one gate task, N member tasks
//!
//! Adding a member wires two edges: the representative depends on the member
//! and the member depends on the gate. The gate therefore always runs before
//! any member, and the representative never completes before every member has
//! either run or been disabled.

use tracing::debug;

use horizon_core::config::gate_task_name;

use crate::project::Project;
use crate::task::{TaskDefinition, TaskHandle, TaskId, TaskRef};

/// A declared horizon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonGroup {
    name: String,
    representative: TaskHandle,
    gate: TaskHandle,
    members: Vec<TaskHandle>,
}

impl HorizonGroup {
    pub(crate) fn new(package: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            representative: TaskHandle::new(TaskId::new(package, name)),
            gate: TaskHandle::new(TaskId::new(package, gate_task_name(name))),
            members: Vec::new(),
        }
    }

    /// Horizon name (also the representative task name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package the horizon tasks live in
    pub fn package(&self) -> &str {
        &self.representative.id().package
    }

    /// The representative (horizon) task
    pub fn representative(&self) -> &TaskHandle {
        &self.representative
    }

    /// The gate task
    pub fn gate(&self) -> &TaskHandle {
        &self.gate
    }

    /// Member tasks, in the order they were added
    pub fn members(&self) -> &[TaskHandle] {
        &self.members
    }

    pub(crate) fn push_member(&mut self, member: TaskHandle) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }
}

/// Errors raised while declaring or evaluating horizons
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GroupError {
    /// A value is not one of the accepted task reference forms
    #[error("Invalid task reference: {0}")]
    InvalidArgument(String),

    /// The representative task is not part of the current run graph
    #[error("Task '{0}' is not scheduled in this run")]
    NodeNotScheduled(TaskId),

    /// No horizon with that name has been declared
    #[error("Unknown horizon '{0}'")]
    UnknownHorizon(String),

    /// A task with the same identity was already registered
    #[error("Task '{0}' is already registered")]
    DuplicateTask(TaskId),

    /// Horizon names are unique across packages
    #[error("Horizon '{0}' is already declared")]
    DuplicateHorizon(String),
}

/// Mutable view over one horizon of a [`Project`], used to declare members
/// and the representative task's own inputs and outputs.
pub struct HorizonBuilder<'p> {
    project: &'p mut Project,
    index: usize,
}

impl<'p> HorizonBuilder<'p> {
    pub(crate) fn new(project: &'p mut Project, index: usize) -> Self {
        Self { project, index }
    }

    /// The horizon being configured
    pub fn group(&self) -> &HorizonGroup {
        &self.project.horizons()[self.index]
    }

    /// Add a member task.
    ///
    /// The representative gains a dependency on the member and the member
    /// gains a dependency on the gate.
    pub fn add(&mut self, task: impl Into<TaskRef>) -> &mut Self {
        let group = self.group().clone();
        let member = self.project.resolve(task.into(), group.package());

        self.project.add_dependency(group.representative(), &member);
        self.project.add_dependency(&member, group.gate());
        debug!(horizon = %group.name(), member = %member, "added horizon member");

        self.project.horizon_at_mut(self.index).push_member(member);
        self
    }

    /// Add several member tasks
    pub fn add_all<I, T>(&mut self, tasks: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskRef>,
    {
        for task in tasks {
            self.add(task);
        }
        self
    }

    /// Add a member from an untyped configuration value.
    ///
    /// Fails with [`GroupError::InvalidArgument`] when the value is not a task reference.
    pub fn add_value(&mut self, value: &serde_json::Value) -> Result<&mut Self, GroupError> {
        let task = TaskRef::try_from(value)?;
        Ok(self.add(task))
    }

    /// Declare the representative task's inputs and outputs.
    ///
    /// Marks the representative cacheable, then applies `action` to its definition.
    pub fn configure_outputs(&mut self, action: impl FnOnce(&mut TaskDefinition)) -> &mut Self {
        let id = self.group().representative().id().clone();
        if let Some(definition) = self.project.task_mut(&id) {
            definition.cacheable = true;
            action(definition);
        }
        self
    }
}
