//! Mesh error types

use thiserror::Error;

/// Errors that can occur on the bus, in the workspace or in agent runtimes
#[derive(Error, Debug)]
pub enum MeshError {
    /// A required message field is missing or empty
    #[error("Invalid message: missing required field `{field}`")]
    InvalidMessage {
        /// Name of the offending field
        field: String,
    },

    /// Operation attempted on a bus that has not been started (or was stopped)
    #[error("Message bus is not running")]
    BusNotRunning,

    /// A subscriber callback or routing rule failed
    #[error("Delivery to {recipient} failed: {reason}")]
    DeliveryFailure {
        /// Intended recipient
        recipient: String,
        /// Failure description
        reason: String,
    },

    /// No handler registered for the requested intent
    #[error("Unknown intent: {0}")]
    UnknownIntent(String),

    /// No lookup source registered under this name
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Agent-specific processing failed for one message
    #[error("Agent processing failed: {0}")]
    AgentProcessing(String),

    /// Workspace keys must be non-empty
    #[error("Invalid workspace key: {0:?}")]
    InvalidKey(String),

    /// Illegal agent status transition
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// Runtime used before `initialize`
    #[error("Agent not initialized: {0}")]
    NotInitialized(String),

    /// Agent id not present in the manager
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Agent id already present in the manager
    #[error("Agent already registered: {0}")]
    AgentAlreadyRegistered(String),

    /// Agent is already listening
    #[error("Agent already running: {0}")]
    AgentAlreadyRunning(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl MeshError {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        MeshError::Other(msg.into())
    }

    /// Create an invalid-message error for a field
    pub fn invalid_message(field: impl Into<String>) -> Self {
        MeshError::InvalidMessage {
            field: field.into(),
        }
    }

    /// Create an agent processing error
    pub fn processing(msg: impl Into<String>) -> Self {
        MeshError::AgentProcessing(msg.into())
    }

    /// Short machine-readable name of the error kind, used in error results
    pub fn kind(&self) -> &'static str {
        match self {
            MeshError::InvalidMessage { .. } => "invalid_message",
            MeshError::BusNotRunning => "bus_not_running",
            MeshError::DeliveryFailure { .. } => "delivery_failure",
            MeshError::UnknownIntent(_) => "unknown_intent",
            MeshError::UnknownSource(_) => "unknown_source",
            MeshError::AgentProcessing(_) => "agent_processing",
            MeshError::InvalidKey(_) => "invalid_key",
            MeshError::InvalidTransition { .. } => "invalid_transition",
            MeshError::NotInitialized(_) => "not_initialized",
            MeshError::AgentNotFound(_) => "agent_not_found",
            MeshError::AgentAlreadyRegistered(_) => "agent_already_registered",
            MeshError::AgentAlreadyRunning(_) => "agent_already_running",
            MeshError::InvalidConfig(_) => "invalid_config",
            MeshError::Io(_) => "io",
            MeshError::Serialization(_) => "serialization",
            MeshError::Other(_) => "other",
        }
    }
}

/// Result type alias for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MeshError::invalid_message("intent");
        assert_eq!(
            err.to_string(),
            "Invalid message: missing required field `intent`"
        );

        let err = MeshError::BusNotRunning;
        assert_eq!(err.to_string(), "Message bus is not running");

        let err = MeshError::InvalidTransition {
            from: "stopped".into(),
            to: "listening".into(),
        };
        assert_eq!(err.to_string(), "Invalid status transition: stopped -> listening");
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: MeshError = serde_err.into();
        assert!(matches!(err, MeshError::Serialization(_)));
        assert_eq!(err.kind(), "serialization");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(MeshError::UnknownIntent("x".into()).kind(), "unknown_intent");
        assert_eq!(MeshError::UnknownSource("x".into()).kind(), "unknown_source");
    }
}
