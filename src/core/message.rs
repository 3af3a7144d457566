//! Message and payload types exchanged over the bus
//!
//! A [`Message`] is created by its sender, stamped with an id and timestamp by
//! the bus on `send`, and never mutated afterwards. Replies are new messages
//! whose `correlates_with` points at the original id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::error::{MeshError, MeshResult};

/// Unique message identifier (UUID v4 string)
pub type MessageId = String;

/// Recipient name that fans a message out to every known recipient
pub const BROADCAST: &str = "broadcast";

/// Intent used for replies produced by agent runtimes
pub const RESPONSE_INTENT: &str = "response";

/// One unit of communication between participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Assigned by the bus when absent
    #[serde(default, alias = "message_id")]
    pub id: Option<MessageId>,

    /// Sending participant
    #[serde(default)]
    pub sender: String,

    /// Receiving participant, or [`BROADCAST`]
    #[serde(default)]
    pub recipient: String,

    /// Role of the sender ("user", "researcher", ...)
    #[serde(default)]
    pub role: String,

    /// What the sender wants done
    #[serde(default)]
    pub intent: String,

    /// Payload
    pub content: Content,

    /// Assigned by the bus when absent
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Id of the message this one answers
    #[serde(default, alias = "original_message_id")]
    pub correlates_with: Option<MessageId>,
}

impl Message {
    /// Create a message without id or timestamp; the bus assigns both on send
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        role: impl Into<String>,
        intent: impl Into<String>,
        content: Content,
    ) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            recipient: recipient.into(),
            role: role.into(),
            intent: intent.into(),
            content,
            timestamp: None,
            correlates_with: None,
        }
    }

    /// Build a `response` message addressed to the sender of `original`
    pub fn response_to(
        original: &Message,
        sender: impl Into<String>,
        role: impl Into<String>,
        content: Content,
    ) -> Self {
        Self {
            id: Some(new_message_id()),
            sender: sender.into(),
            recipient: original.sender.clone(),
            role: role.into(),
            intent: RESPONSE_INTENT.to_string(),
            content,
            timestamp: Some(Utc::now()),
            correlates_with: original.id.clone(),
        }
    }

    /// Parse a message from JSON; absent required fields become `InvalidMessage`
    pub fn from_json(json: &str) -> MeshResult<Self> {
        let message: Message = serde_json::from_str(json).map_err(|e| {
            match missing_field(&e.to_string()) {
                Some(field) => MeshError::invalid_message(field),
                None => MeshError::Serialization(e),
            }
        })?;
        message.validate()?;
        Ok(message)
    }

    /// Set an explicit id
    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Check that every required field is present
    pub fn validate(&self) -> MeshResult<()> {
        let required = [
            ("sender", &self.sender),
            ("recipient", &self.recipient),
            ("role", &self.role),
            ("intent", &self.intent),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(MeshError::invalid_message(name));
            }
        }
        Ok(())
    }

    /// Fill in id and timestamp if the sender left them out
    pub(crate) fn stamp(&mut self) {
        if self.id.as_deref().map_or(true, str::is_empty) {
            self.id = Some(new_message_id());
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now());
        }
    }

    /// Whether this message fans out to all known recipients
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST
    }

    /// Id as a string slice, empty when unassigned
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }
}

/// Generate a fresh message id
pub fn new_message_id() -> MessageId {
    Uuid::new_v4().to_string()
}

fn missing_field(serde_msg: &str) -> Option<String> {
    let rest = serde_msg.strip_prefix("missing field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

/// Message payload, one variant per capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Content {
    /// No payload
    Empty,

    /// Free-form text
    Text(String),

    /// Multi-source research request
    Research(ResearchRequest),

    /// Single-source quick lookup
    Search(SearchRequest),

    /// Analysis of supplied data
    Analyze(AnalyzeRequest),

    /// Structured result produced by an agent
    Result(Value),

    /// Structured error result
    Error(ErrorReport),

    /// Untyped JSON payload for intents without a dedicated variant
    Json(Value),
}

impl Content {
    /// Create a text payload
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text(text.into())
    }

    /// Create an error payload from a mesh error
    pub fn error(err: &MeshError) -> Self {
        Content::Error(ErrorReport::from_error(err))
    }

    /// Whether this payload reports a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Content::Error(_))
    }

    /// Whether this payload carries nothing worth sending back
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Empty => true,
            Content::Text(text) => text.trim().is_empty(),
            Content::Result(value) | Content::Json(value) => match value {
                Value::Null => true,
                Value::Object(map) => map.is_empty(),
                Value::Array(items) => items.is_empty(),
                Value::String(s) => s.trim().is_empty(),
                _ => false,
            },
            _ => false,
        }
    }

    /// Short human-readable preview, used in traffic logs and monitor events
    pub fn preview(&self, max_chars: usize) -> String {
        let full = match self {
            Content::Empty => String::new(),
            Content::Text(text) => text.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        };
        if full.chars().count() <= max_chars {
            full
        } else {
            let mut cut: String = full.chars().take(max_chars).collect();
            cut.push_str("...");
            cut
        }
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Empty
    }
}

/// Lookup source names
pub const DEFAULT_RESEARCH_SOURCES: [&str; 2] = ["web", "knowledge"];

/// Request for a multi-source research run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// Topic to research
    #[serde(default)]
    pub topic: String,

    /// Sources to consult in parallel
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Depth hint ("quick", "medium", "deep")
    #[serde(default = "default_depth")]
    pub depth: String,
}

impl ResearchRequest {
    /// Research `topic` on the default sources
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            sources: default_sources(),
            depth: default_depth(),
        }
    }

    /// Override the sources
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Override the depth
    pub fn with_depth(mut self, depth: impl Into<String>) -> Self {
        self.depth = depth.into();
        self
    }
}

fn default_sources() -> Vec<String> {
    DEFAULT_RESEARCH_SOURCES.iter().map(|s| s.to_string()).collect()
}

fn default_depth() -> String {
    "medium".to_string()
}

/// Request for a quick lookup on one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text
    #[serde(default)]
    pub query: String,

    /// Source name
    #[serde(default = "default_search_source")]
    pub source: String,
}

impl SearchRequest {
    /// Search `query` on the web source
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            source: default_search_source(),
        }
    }

    /// Override the source
    pub fn on(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

fn default_search_source() -> String {
    "web".to_string()
}

/// Kind of analysis to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    /// Short textual summary
    Summary,
    /// Trend extraction
    Trends,
}

impl Default for AnalysisKind {
    fn default() -> Self {
        AnalysisKind::Summary
    }
}

/// Request to analyze supplied data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Data to analyze
    #[serde(default)]
    pub data: Value,

    /// Analysis to run
    #[serde(default, rename = "type")]
    pub kind: AnalysisKind,
}

impl AnalyzeRequest {
    /// Analyze `data` with the given kind
    pub fn new(data: Value, kind: AnalysisKind) -> Self {
        Self { data, kind }
    }
}

/// Structured error carried back to the sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error description
    pub error: String,

    /// Machine-readable error kind
    #[serde(default)]
    pub kind: String,

    /// Always "failed"
    #[serde(default = "default_failed")]
    pub status: String,
}

impl ErrorReport {
    /// Create a report from a description
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: "other".to_string(),
            status: default_failed(),
        }
    }

    /// Create a report from a mesh error
    pub fn from_error(err: &MeshError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
            status: default_failed(),
        }
    }
}

fn default_failed() -> String {
    "failed".to_string()
}
