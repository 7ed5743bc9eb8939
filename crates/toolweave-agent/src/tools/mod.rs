//! Tool routing for the agent.

pub mod registry;
pub mod schema;

pub use registry::{RegistryError, ToolRegistry, SEPARATOR};
