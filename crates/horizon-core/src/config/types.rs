//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::defaults::DEFAULT_HORIZON_NAME;

/// Main configuration for Horizon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Task execution configuration
    pub tasks: TasksConfig,

    /// Packages and the tasks they declare, keyed by package name
    pub packages: BTreeMap<String, PackageConfig>,

    /// Declared horizons
    pub horizons: Vec<HorizonConfig>,
}

/// Task execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// Maximum concurrent tasks
    pub concurrency: usize,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Execution history configuration
    pub history: HistoryConfig,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            cache: CacheConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

/// A package and its tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageConfig {
    /// Tasks declared by this package, keyed by task name
    pub tasks: BTreeMap<String, PipelineTask>,
}

/// A task in the pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineTask {
    /// Shell command to execute
    pub command: Option<String>,

    /// Tasks that must complete first ("task" or "package:task")
    pub depends_on: Vec<String>,

    /// Output glob patterns
    pub outputs: Vec<String>,

    /// Input glob patterns
    pub inputs: Vec<String>,

    /// Environment variables
    pub env: HashMap<String, String>,

    /// Value inputs that take part in the fingerprint
    pub properties: BTreeMap<String, String>,

    /// Whether the task result may be stored in and restored from the cache
    pub cacheable: bool,
}

/// A horizon: one representative task guarding a group of member tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Horizon name; the representative task takes this name and the gate
    /// task is named `<name>IsCached`
    pub name: String,

    /// Package the horizon tasks are registered in
    pub package: String,

    /// Member task references. Each must be a task name (`"compile"` or
    /// `"package:compile"`); anything else is rejected when the horizon is built.
    pub members: Vec<serde_json::Value>,

    /// Inputs of the representative task
    pub inputs: Vec<String>,

    /// Outputs of the representative task
    pub outputs: Vec<String>,

    /// Optional action for the representative task
    pub command: Option<String>,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_HORIZON_NAME.to_string(),
            package: String::new(),
            members: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            command: None,
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,

    /// Cache directory
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".horizon/cache"),
        }
    }
}

/// Execution history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory holding one execution state per task
    pub dir: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".horizon/history"),
        }
    }
}
