//! Store traits and implementations.

pub mod job;
pub mod memory;

pub use job::{JobStore, PgJobStore};
pub use memory::MemoryJobStore;
