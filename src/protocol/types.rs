//! Payload types exchanged with the companion service

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned conversational stage. Advisory only, never computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Emotional,
    Rational,
    Solution,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Emotional => "emotional",
            Phase::Rational => "rational",
            Phase::Solution => "solution",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation-level metadata carried by a `metadata` frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPayload {
    #[serde(default)]
    pub conversation_id: Option<i64>,
    pub phase: Phase,
    pub round_count: u32,
    #[serde(default)]
    pub is_privacy: bool,
    #[serde(default)]
    pub is_complex: bool,
}

/// One decoded event of the send stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Opens a reply and replaces the conversation metadata
    Metadata(MetadataPayload),
    /// Text to append to the open reply
    Chunk { content: String },
    /// Standalone crisis alert, never merged into the reply
    Crisis { content: String },
    /// Server-side processing failure reported inside the stream
    Error { content: String },
    /// Terminator; nothing follows
    End,
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Metadata(_) => "metadata",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Crisis { .. } => "crisis",
            StreamEvent::Error { .. } => "error",
            StreamEvent::End => "end",
        }
    }
}

/// Body of `POST /api/chat/send`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub message: String,
    pub conversation_id: Option<i64>,
}

/// Body returned by `DELETE /api/chat/clear`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl ClearResponse {
    /// The farewell text, if the server supplied a non-blank one
    pub fn farewell(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

/// Body returned by `GET /api/chat/active`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActiveConversation {
    #[serde(default)]
    pub conversation_id: Option<i64>,
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub round_count: u32,
    #[serde(default)]
    pub status: Option<String>,
}
