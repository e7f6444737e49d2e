//! Exit codes for the CLI

use horizon_core::{ConfigError, HorizonError};
use horizon_tasks::{DagError, GroupError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// Validation error
pub const VALIDATION_ERROR: i32 = 5;

/// One or more tasks failed
pub const TASK_FAILED: i32 = 6;

/// A command finished but reported failures it already printed
#[derive(Debug)]
pub enum Failure {
    /// Tasks failed during a run
    Tasks(usize),
    /// Validation found errors
    Validation(usize),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        match self {
            Failure::Tasks(n) => write!(f, "{} task{} failed", n, plural(*n)),
            Failure::Validation(n) => {
                write!(f, "validation failed with {} error{}", n, plural(*n))
            }
        }
    }
}

impl std::error::Error for Failure {}

/// Map an error to the process exit code
pub fn for_error(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<Failure>() {
        Some(Failure::Tasks(_)) => return TASK_FAILED,
        Some(Failure::Validation(_)) => return VALIDATION_ERROR,
        None => {}
    }

    let config_error = error.downcast_ref::<ConfigError>().is_some()
        || error.downcast_ref::<GroupError>().is_some()
        || error.downcast_ref::<DagError>().is_some()
        || matches!(
            error.downcast_ref::<HorizonError>(),
            Some(HorizonError::Config(_))
        );
    if config_error {
        CONFIG_ERROR
    } else {
        ERROR
    }
}
