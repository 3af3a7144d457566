//! Agent runtime and supervision
//!
//! This module provides the infrastructure for running agents:
//! - `Agent` - Trait implemented by agent-specific logic
//! - `AgentInternals` - The agent's view of the bus, workspace and monitor
//! - `AgentRuntime` - Polls the bus and handles each message in its own task
//! - `AgentManager` - Registry that starts and stops runtimes together

pub mod agent;
pub mod internals;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod runtime;

pub use agent::Agent;
pub use internals::AgentInternals;
pub use manager::AgentManager;
pub use runtime::{AgentRuntime, RuntimeStatus};
