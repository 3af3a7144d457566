//! Core types for the mesh
//!
//! This module provides the fundamental types used throughout the crate:
//! - `Message` / `Content` - Units of communication and their payloads
//! - `AgentStatus` - Lifecycle state machine of an agent runtime
//! - `MeshError` - Error types

pub mod error;
pub mod message;
pub mod state;

pub use error::{MeshError, MeshResult};
pub use message::{
    new_message_id, AnalysisKind, AnalyzeRequest, Content, ErrorReport, Message, MessageId,
    ResearchRequest, SearchRequest, BROADCAST, RESPONSE_INTENT,
};
pub use state::AgentStatus;
