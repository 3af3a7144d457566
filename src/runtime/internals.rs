//! AgentInternals - an agent's view of the mesh
//!
//! The `AgentInternals` struct is what `Agent::process` receives. It provides
//! methods to:
//! - Send messages through the bus under the agent's identity
//! - Read and write the shared workspace
//! - Report status, reasoning, task progress and errors to the monitor

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::bus::MessageBus;
use crate::core::{new_message_id, AgentStatus, Content, MeshResult, Message, MessageId};
use crate::monitor::{MonitorEvent, NoopMonitor, SharedMonitor};
use crate::workspace::{WriteOutcome, Workspace};

/// Collaborators bound to one agent by `AgentRuntime::initialize`
#[derive(Clone)]
pub struct AgentInternals {
    agent_id: String,
    role: String,
    bus: MessageBus,
    workspace: Workspace,
    monitor: SharedMonitor,
}

impl AgentInternals {
    /// Create internals with a no-op monitor
    pub fn new(
        agent_id: impl Into<String>,
        role: impl Into<String>,
        bus: MessageBus,
        workspace: Workspace,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            bus,
            workspace,
            monitor: Arc::new(NoopMonitor),
        }
    }

    /// Replace the monitor
    pub fn with_monitor(mut self, monitor: SharedMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Send a message from this agent with an agent-assigned id and timestamp
    pub async fn send(
        &self,
        recipient: &str,
        intent: &str,
        content: Content,
    ) -> MeshResult<MessageId> {
        let mut message = Message::new(&self.agent_id, recipient, &self.role, intent, content)
            .with_id(new_message_id());
        message.timestamp = Some(Utc::now());
        self.dispatch(message).await
    }

    /// Send a `response` to the sender of `original`
    pub async fn reply(&self, original: &Message, content: Content) -> MeshResult<MessageId> {
        let message = Message::response_to(original, &self.agent_id, &self.role, content);
        self.dispatch(message).await
    }

    async fn dispatch(&self, message: Message) -> MeshResult<MessageId> {
        self.monitor
            .publish(MonitorEvent::message(&self.agent_id, "out", &message));
        self.bus.send(message).await
    }

    // =========================================================================
    // Workspace
    // =========================================================================

    /// Write `key` with this agent as writer
    pub async fn update_workspace(&self, key: &str, value: Value) -> MeshResult<WriteOutcome> {
        self.workspace.set(key, value, &self.agent_id).await
    }

    /// Read `key`
    pub async fn read_workspace(&self, key: &str) -> Option<Value> {
        self.workspace.get(key).await
    }

    // =========================================================================
    // Monitoring
    // =========================================================================

    /// Mirror a status change into the workspace and the monitor
    ///
    /// Failures are logged, never returned.
    pub async fn report_status(&self, status: AgentStatus, detail: Option<String>) {
        self.monitor.publish(MonitorEvent::status(
            &self.agent_id,
            status,
            detail.as_deref(),
        ));
        if let Err(e) = self
            .workspace
            .update_agent_status(&self.agent_id, status, detail)
            .await
        {
            tracing::warn!(agent_id = %self.agent_id, error = %e, "Failed to record agent status");
        }
    }

    /// Publish a reasoning note
    pub fn think(&self, thought: impl Into<String>) {
        let thought = thought.into();
        tracing::debug!(agent_id = %self.agent_id, thought = %thought, "Agent thinking");
        self.monitor
            .publish(MonitorEvent::thinking(&self.agent_id, thought));
    }

    /// Publish task progress
    pub fn report_task(&self, task: &str, state: &str, detail: Value) {
        self.monitor
            .publish(MonitorEvent::task(&self.agent_id, task, state, detail));
    }

    /// Publish an incoming message
    pub fn report_incoming(&self, message: &Message) {
        self.monitor
            .publish(MonitorEvent::message(&self.agent_id, "in", message));
    }

    /// Publish an error
    pub fn report_error(&self, error: impl Into<String>) {
        self.monitor
            .publish(MonitorEvent::error(&self.agent_id, error));
    }

    /// Publish timing or counter data
    pub fn report_performance(&self, metrics: Value) {
        self.monitor
            .publish(MonitorEvent::performance(&self.agent_id, metrics));
    }
}

impl std::fmt::Debug for AgentInternals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentInternals")
            .field("agent_id", &self.agent_id)
            .field("role", &self.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::monitor::{BroadcastMonitor, EventKind};
    use serde_json::json;

    async fn internals() -> (AgentInternals, BroadcastMonitor) {
        let config = MeshConfig::default();
        let bus = MessageBus::new(&config);
        bus.start().await;
        let monitor = BroadcastMonitor::new();
        let internals = AgentInternals::new("writer", "tester", bus, Workspace::new(&config))
            .with_monitor(Arc::new(monitor.clone()));
        (internals, monitor)
    }

    #[tokio::test]
    async fn test_send_assigns_identity() {
        let (internals, monitor) = internals().await;
        let mut events = monitor.subscribe();

        let id = internals
            .send("reader", "note", Content::text("hello"))
            .await
            .unwrap();

        let queued = internals.bus().drain("reader").await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].id.as_deref(), Some(id.as_str()));
        assert_eq!(queued[0].sender, "writer");
        assert_eq!(queued[0].role, "tester");
        assert!(queued[0].timestamp.is_some());

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Message);
        assert_eq!(event.data["direction"], "out");
    }

    #[tokio::test]
    async fn test_workspace_helpers_use_agent_as_writer() {
        let (internals, _monitor) = internals().await;
        internals.update_workspace("k", json!(42)).await.unwrap();

        assert_eq!(internals.read_workspace("k").await, Some(json!(42)));
        let entry = internals.workspace().get_with_metadata("k").await.unwrap();
        assert_eq!(entry.metadata.writer, "writer");
    }

    #[tokio::test]
    async fn test_report_status_mirrors_to_workspace() {
        let (internals, monitor) = internals().await;
        let mut events = monitor.subscribe();

        internals
            .report_status(AgentStatus::Listening, Some("ready".into()))
            .await;

        let record = internals
            .workspace()
            .get_agent_status("writer")
            .await
            .unwrap();
        assert_eq!(record.status, AgentStatus::Listening);
        assert_eq!(record.detail.as_deref(), Some("ready"));

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Status);
        assert_eq!(event.data["status"], "listening");
    }
}
