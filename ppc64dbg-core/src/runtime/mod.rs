//! Collaborator interfaces for registers and memory of the inspected thread.

pub mod context;
pub mod memory;

pub use context::{CpuContext, RegisterContext, RegisterValue};
pub use memory::{MemoryManager, TargetMemory};
