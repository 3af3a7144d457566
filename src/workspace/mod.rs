//! Shared workspace
//!
//! A key/value namespace shared by every agent:
//! - `Workspace` - per-key locked store with write metadata and subscriptions
//! - `ChangeRecord` - entry of the bounded change log
//! - `AgentStatusRecord` - status entries kept under `agent_status_<id>`

pub mod change;
pub mod status;
#[allow(clippy::module_inception)]
pub mod workspace;

pub use change::{ChangeOp, ChangeRecord, Entry, EntryMetadata, WriteOutcome};
pub use status::{status_key, AgentStatusRecord, STATUS_KEY_PREFIX};
pub use workspace::{Workspace, WorkspaceSnapshot, WorkspaceStats, WILDCARD};
