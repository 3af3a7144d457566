//! Agent trait - the per-capability message handler

use async_trait::async_trait;

use crate::core::{Content, MeshResult, Message};

use super::internals::AgentInternals;

/// Agent-specific logic driven by an [`AgentRuntime`](super::AgentRuntime)
///
/// `process` is called once per drained message, possibly concurrently for
/// several messages. Returning `Ok(Some(content))` sends a `response` back to
/// the sender; `Ok(None)` sends nothing; an error is logged and sent back as an
/// error result.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Role attached to every message this agent sends
    fn role(&self) -> &str;

    /// Handle one message
    async fn process(
        &self,
        message: &Message,
        internals: &AgentInternals,
    ) -> MeshResult<Option<Content>>;
}
