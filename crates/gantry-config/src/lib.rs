//! KDL configuration parsing for the Gantry CI orchestrator.
//!
//! This crate handles:
//! - Server and notification settings (`server`, `chat`)
//! - Repository definitions with their build and deploy pipelines
//! - The static repository registry built from them
//! - Variable interpolation in command lines

mod nodes;

pub mod error;
pub mod registry;
pub mod repository;
pub mod system;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use registry::StaticRegistry;
pub use system::{ChatConfig, Config, ServerConfig, load_config, parse_config};
pub use variables::{
    GitContext, JobContext, RepoContext, VariableContext, VariableContextBuilder,
};
