//! Agent status records stored under the `agent_status_` key namespace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentStatus;

/// Key prefix reserved for agent status records
pub const STATUS_KEY_PREFIX: &str = "agent_status_";

/// Workspace key holding the status of `agent_id`
pub fn status_key(agent_id: &str) -> String {
    format!("{}{}", STATUS_KEY_PREFIX, agent_id)
}

/// Last reported status of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentStatusRecord {
    pub fn new(agent_id: impl Into<String>, status: AgentStatus, detail: Option<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            status,
            detail,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_key() {
        assert_eq!(status_key("researcher"), "agent_status_researcher");
    }

    #[test]
    fn test_record_json_shape() {
        let record = AgentStatusRecord::new("r1", AgentStatus::Listening, None);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["agent_id"], "r1");
        assert_eq!(value["status"], "listening");
        assert!(value["timestamp"].is_string());
    }
}
