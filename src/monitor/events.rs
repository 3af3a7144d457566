//! Monitor event records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentStatus, Message};

/// Category of a monitor event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Runtime status transition
    Status,
    /// Free-form reasoning note from an agent
    Thinking,
    /// Task progress (started, finished, failed)
    Task,
    /// Message traffic
    Message,
    /// Failure report
    Error,
    /// Timing and counters
    Performance,
}

/// One structured record published to a monitor
///
/// Serializes as `{type, agent_id, timestamp, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl MonitorEvent {
    pub fn new(kind: EventKind, agent_id: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn status(agent_id: &str, status: AgentStatus, detail: Option<&str>) -> Self {
        Self::new(
            EventKind::Status,
            agent_id,
            json!({ "status": status, "detail": detail }),
        )
    }

    pub fn thinking(agent_id: &str, thought: impl Into<String>) -> Self {
        Self::new(EventKind::Thinking, agent_id, json!({ "thought": thought.into() }))
    }

    /// Task progress; `state` is e.g. "started", "completed", "failed"
    pub fn task(agent_id: &str, task: &str, state: &str, detail: Value) -> Self {
        Self::new(
            EventKind::Task,
            agent_id,
            json!({ "task": task, "state": state, "detail": detail }),
        )
    }

    /// Message traffic summary; `direction` is "in" or "out"
    pub fn message(agent_id: &str, direction: &str, message: &Message) -> Self {
        Self::new(
            EventKind::Message,
            agent_id,
            json!({
                "direction": direction,
                "message_id": message.id,
                "sender": message.sender,
                "recipient": message.recipient,
                "intent": message.intent,
                "preview": message.content.preview(100),
            }),
        )
    }

    pub fn error(agent_id: &str, error: impl Into<String>) -> Self {
        Self::new(EventKind::Error, agent_id, json!({ "error": error.into() }))
    }

    pub fn performance(agent_id: &str, metrics: Value) -> Self {
        Self::new(EventKind::Performance, agent_id, metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Content;

    #[test]
    fn test_event_json_shape() {
        let event = MonitorEvent::status("r1", AgentStatus::Processing, Some("batch of 2"));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "status");
        assert_eq!(value["agent_id"], "r1");
        assert!(value["timestamp"].is_string());
        assert_eq!(value["data"]["status"], "processing");
        assert_eq!(value["data"]["detail"], "batch of 2");
    }

    #[test]
    fn test_message_event_preview() {
        let message = Message::new("a", "b", "user", "say", Content::text("x".repeat(300)));
        let event = MonitorEvent::message("b", "in", &message);
        let preview = event.data["preview"].as_str().unwrap();
        assert!(preview.len() < 120);
        assert_eq!(event.data["intent"], "say");
    }
}
