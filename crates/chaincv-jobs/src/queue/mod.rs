//! Task queue clients.

pub mod conductor;
pub mod memory;

pub use conductor::{ConductorClient, ConductorConfig};
pub use memory::{MemoryQueue, WorkflowRun, WorkflowStatus};
