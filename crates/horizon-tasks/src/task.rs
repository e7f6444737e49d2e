//! Task types and definitions

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::horizon::GroupError;

/// Unique identifier for a task within the workspace
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    /// Package name
    pub package: String,
    /// Task name (e.g., "compile", "test", "assemble")
    pub task_name: String,
}

impl TaskId {
    /// Create a new task ID
    pub fn new(package: impl Into<String>, task_name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            task_name: task_name.into(),
        }
    }

    /// Parse a task ID from "package:task" format
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, ':').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1]))
        } else {
            None
        }
    }

    /// Resolve a possibly unqualified task name against a package
    pub fn resolve(s: &str, default_package: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| Self::new(default_package, s))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.task_name)
    }
}

/// What executing a task does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskCommand {
    /// Shell command to execute
    Shell(String),
    /// Evaluate the named horizon and disable its members when it is satisfiable
    Gate { horizon: String },
    /// No action; the task only aggregates its dependencies
    Lifecycle,
}

impl TaskCommand {
    /// Short label used in fingerprints and plans
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Shell(_) => "shell",
            Self::Gate { .. } => "gate",
            Self::Lifecycle => "lifecycle",
        }
    }
}

/// Definition of a task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task name (e.g., "compile", "test", "assemble")
    pub name: String,

    /// Command to execute
    #[serde(default)]
    pub command: Option<String>,

    /// Horizon evaluated by this task, set only on gate tasks
    #[serde(default)]
    pub gate_for: Option<String>,

    /// Tasks that must complete first ("task" in the same package or "package:task")
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Output glob patterns
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Input glob patterns
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Environment variables to pass
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Value inputs snapshotted into the fingerprint
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Whether results may be stored in and restored from the cache
    #[serde(default)]
    pub cacheable: bool,
}

impl TaskDefinition {
    /// Create a new task definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Add a dependency
    pub fn with_depends_on(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Set output globs
    pub fn with_outputs(mut self, outputs: Vec<String>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Set input globs
    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Add a value input
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Mark the task as cacheable
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Get the effective command for this task
    pub fn effective_command(&self) -> TaskCommand {
        if let Some(horizon) = &self.gate_for {
            return TaskCommand::Gate {
                horizon: horizon.clone(),
            };
        }
        match &self.command {
            Some(cmd) => TaskCommand::Shell(cmd.clone()),
            None => TaskCommand::Lifecycle,
        }
    }

    /// Whether the task declares outputs, which up-to-date checks require
    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    /// Whether the task's result can be taken from the cache
    pub fn is_cacheable(&self) -> bool {
        self.cacheable && self.has_outputs()
    }
}

/// Lazy handle to a registered task. The task behind it is only looked up
/// when the run graph is built.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TaskHandle(TaskId);

impl TaskHandle {
    /// Create a handle for a task identity
    pub fn new(id: TaskId) -> Self {
        Self(id)
    }

    /// Identity of the referenced task
    pub fn id(&self) -> &TaskId {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A realized task: identity plus its full definition
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Task identity
    pub id: TaskId,
    /// Task definition
    pub definition: TaskDefinition,
}

impl Task {
    /// Create a realized task in a package
    pub fn new(package: impl Into<String>, definition: TaskDefinition) -> Self {
        Self {
            id: TaskId::new(package, definition.name.clone()),
            definition,
        }
    }
}

/// A reference to a task in one of the three accepted forms
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRef {
    /// Task name ("task" or "package:task"), resolved when the graph is built
    ByName(String),
    /// Lazy handle returned by registration
    Lazy(TaskHandle),
    /// Already realized task instance
    Realized(Task),
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        Self::ByName(name.to_string())
    }
}

impl From<String> for TaskRef {
    fn from(name: String) -> Self {
        Self::ByName(name)
    }
}

impl From<TaskHandle> for TaskRef {
    fn from(handle: TaskHandle) -> Self {
        Self::Lazy(handle)
    }
}

impl From<&TaskHandle> for TaskRef {
    fn from(handle: &TaskHandle) -> Self {
        Self::Lazy(handle.clone())
    }
}

impl From<Task> for TaskRef {
    fn from(task: Task) -> Self {
        Self::Realized(task)
    }
}

impl TryFrom<&serde_json::Value> for TaskRef {
    type Error = GroupError;

    /// Declarative configuration can only name tasks; any other value is rejected.
    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(name) if !name.is_empty() => Ok(Self::ByName(name.clone())),
            other => Err(GroupError::InvalidArgument(format!(
                "must be a task name, task handle, or task, this was {}",
                describe_value(other)
            ))),
        }
    }
}

fn describe_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => format!("a boolean ({})", b),
        serde_json::Value::Number(n) => format!("a number ({})", n),
        serde_json::Value::String(_) => "an empty string".to_string(),
        serde_json::Value::Array(_) => "an array".to_string(),
        serde_json::Value::Object(_) => "an object".to_string(),
    }
}
