//! Configuration validation

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::defaults::gate_task_name;
use super::types::Config;

fn horizon_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("valid regex"))
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_tasks(config)?;
    validate_packages(config)?;
    validate_horizons(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_tasks(config: &Config) -> Result<()> {
    if config.tasks.concurrency == 0 {
        return Err(ConfigError::InvalidValue {
            field: "tasks.concurrency".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }
    Ok(())
}

fn validate_packages(config: &Config) -> Result<()> {
    for (package, package_config) in &config.packages {
        if package.is_empty() || package.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: format!("packages.{}", package),
                message: "package name cannot be empty or contain ':'".to_string(),
            }
            .into());
        }

        for (task, definition) in &package_config.tasks {
            if task.is_empty() || task.contains(':') {
                return Err(ConfigError::InvalidValue {
                    field: format!("packages.{}.tasks.{}", package, task),
                    message: "task name cannot be empty or contain ':'".to_string(),
                }
                .into());
            }
            if definition.depends_on.iter().any(|d| d.is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: format!("packages.{}.tasks.{}.depends_on", package, task),
                    message: "dependency names cannot be empty".to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn validate_horizons(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for (i, horizon) in config.horizons.iter().enumerate() {
        if !horizon_name_pattern().is_match(&horizon.name) {
            return Err(ConfigError::InvalidValue {
                field: format!("horizons[{}].name", i),
                message: format!("'{}' is not a valid task name", horizon.name),
            }
            .into());
        }

        if horizon.package.is_empty() {
            return Err(ConfigError::MissingField(format!("horizons[{}].package", i)).into());
        }

        let Some(package) = config.packages.get(&horizon.package) else {
            return Err(ConfigError::InvalidValue {
                field: format!("horizons[{}].package", i),
                message: format!("package '{}' is not declared", horizon.package),
            }
            .into());
        };

        if !seen.insert(horizon.name.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: format!("horizons[{}].name", i),
                message: format!("horizon '{}' is already declared", horizon.name),
            }
            .into());
        }

        let gate = gate_task_name(&horizon.name);
        for reserved in [horizon.name.as_str(), gate.as_str()] {
            if package.tasks.contains_key(reserved) {
                return Err(ConfigError::InvalidValue {
                    field: format!("horizons[{}].name", i),
                    message: format!(
                        "task '{}:{}' already exists and would be shadowed by the horizon",
                        horizon.package, reserved
                    ),
                }
                .into());
            }
        }

        if horizon.members.is_empty() {
            debug!(horizon = %horizon.name, "horizon declares no members");
        }
    }

    Ok(())
}
