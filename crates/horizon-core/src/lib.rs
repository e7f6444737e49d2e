//! Horizon Core - shared foundation for the Horizon build runner
//!
//! This crate provides the error taxonomy and the configuration layer
//! (types, discovery, loading and validation) used by the task engine
//! and the CLI.

pub mod config;
pub mod error;

pub use config::{Config, HorizonConfig, PackageConfig, PipelineTask, TasksConfig};
pub use error::{ConfigError, HorizonError, Result};
