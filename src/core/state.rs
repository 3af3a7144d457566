//! Agent status state machine

use serde::{Deserialize, Serialize};

use super::error::{MeshError, MeshResult};

/// Lifecycle status of an agent runtime
///
/// ```text
/// idle -> listening <-> processing
///            |   \         |
///            |    error <--+
///            v      |
///         stopping <+
///            |
///            v
///         stopped -> idle (re-initialize)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Initialized (or freshly created), not yet listening
    Idle,

    /// Polling the bus for messages
    Listening,

    /// A batch of messages is being handled
    Processing,

    /// Stop requested, waiting for in-flight tasks
    Stopping,

    /// All tasks finished, loop exited
    Stopped,

    /// Infrastructure failure; recovers to listening
    Error,
}

impl AgentStatus {
    /// Whether the listen loop should keep running in this status
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            AgentStatus::Listening | AgentStatus::Processing | AgentStatus::Error
        )
    }

    /// Check if the status is terminal until the next `initialize`
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStatus::Stopped)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Idle, Listening)
                | (Idle, Stopping)
                | (Listening, Processing)
                | (Listening, Stopping)
                | (Listening, Error)
                | (Processing, Listening)
                | (Processing, Stopping)
                | (Processing, Error)
                | (Error, Listening)
                | (Error, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Idle)
        )
    }

    /// Validate a transition, returning the new status
    pub fn transition(&self, next: AgentStatus) -> MeshResult<AgentStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(MeshError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Listening => "listening",
            AgentStatus::Processing => "processing",
            AgentStatus::Stopping => "stopping",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        }
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Idle
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_is_valid() {
        let path = [
            AgentStatus::Idle,
            AgentStatus::Listening,
            AgentStatus::Processing,
            AgentStatus::Listening,
            AgentStatus::Processing,
            AgentStatus::Stopping,
            AgentStatus::Stopped,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_error_is_recoverable() {
        assert!(AgentStatus::Listening.can_transition_to(AgentStatus::Error));
        assert!(AgentStatus::Processing.can_transition_to(AgentStatus::Error));
        assert!(AgentStatus::Error.can_transition_to(AgentStatus::Listening));
        assert!(AgentStatus::Error.is_running());
    }

    #[test]
    fn test_stopped_requires_reinitialize() {
        let err = AgentStatus::Stopped
            .transition(AgentStatus::Listening)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidTransition { .. }));
        assert_eq!(
            AgentStatus::Stopped.transition(AgentStatus::Idle).unwrap(),
            AgentStatus::Idle
        );
        assert!(AgentStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(AgentStatus::Processing.to_string(), "processing");
        let json = serde_json::to_string(&AgentStatus::Stopping).unwrap();
        assert_eq!(json, "\"stopping\"");
        let back: AgentStatus = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, AgentStatus::Error);
    }
}
