//! Core data models used throughout docchat.
//!
//! These types represent the conversation messages, document chunks, and
//! retrieval hits that flow between ingestion, retrieval, and generation.

use serde::{Deserialize, Serialize};

/// Who authored a [`Message`].
///
/// Serialized as `"human"` / `"ai"` in session history files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "human")]
    User,
    #[serde(rename = "ai")]
    Assistant,
}

impl Role {
    /// Label used when rendering a transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered message log of one chat session.
///
/// Insertion order is conversation order. Serializes transparently as a
/// JSON array of [`Message`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatHistory {
    messages: Vec<Message>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<Message>> for ChatHistory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// A bounded slice of a document's text, ready to be embedded.
///
/// Chunks are transient: only their embedded form is retained by the
/// vector index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub document: String,
    pub index: usize,
    pub text: String,
}

/// One ranked result of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document: String,
    pub text: String,
    pub score: f32,
}
