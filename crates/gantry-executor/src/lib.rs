//! Command execution backends for the Gantry CI orchestrator.
//!
//! Provides runner implementations for configured commands:
//! - Local shell (`sh -c`)

pub mod shell;

pub use gantry_core::executor::{CommandOutput, CommandRunner, CommandSpec};
pub use shell::ShellRunner;
