//! Core types for ragloop.
//!
//! ## Ingestion
//! - [`Chunk`]: A bounded slice of a source document
//! - [`MemoryRecord`]: A chunk as persisted in a vector collection
//!
//! ## Retrieval
//! - [`NearestQuery`]: Parameters for a nearest-neighbour query
//! - [`RetrievalResult`]: A record paired with its distance to the query
//! - [`Include`]: Payload fields a vector backend may return
//! - [`RecordEmbedding`]: Which vector a reconstructed record carries
//!
//! ## Chat
//! - [`Role`], [`ChatTurn`]: A single message of a conversation
//! - [`Transcript`]: The append-only conversation of one session
//!
//! ## Models
//! - [`ModelInfo`]: A model present in a backend's local registry
//! - [`PullProgress`]: One progress event of a model download

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// A fixed-length embedding vector.
pub type Embedding = Vec<f32>;

// ============================================================================
// Chunks
// ============================================================================

/// A chunk of a source document, ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the document (0-indexed)
    pub index: usize,
    /// Chunk text, source lines joined by a single space
    pub text: String,
    /// Source line range covered by this chunk
    pub line_range: Range<usize>,
}

impl Chunk {
    /// Stable record identifier for this chunk (its index as a string).
    #[must_use]
    pub fn record_id(&self) -> String {
        self.index.to_string()
    }
}

// ============================================================================
// Memory records
// ============================================================================

/// A record stored in a vector collection.
///
/// Identity is `id` within a collection. `embedding` is `None` when the
/// record was reconstructed from a query that did not carry vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Identifier, unique within a collection
    pub id: String,
    /// The text that was embedded
    pub text: String,
    /// Free-form description of the source
    pub description: String,
    /// Embedding vector, if present
    pub embedding: Option<Embedding>,
    /// When the record was created
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a record for locally produced content.
    pub fn local(
        id: impl Into<String>,
        text: impl Into<String>,
        description: impl Into<String>,
        embedding: Option<Embedding>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            description: description.into(),
            embedding,
            timestamp,
        }
    }
}

// ============================================================================
// Retrieval
// ============================================================================

/// Payload fields a vector backend can include in query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Include {
    Documents,
    Embeddings,
    Metadatas,
    Distances,
    Uris,
    Data,
}

impl Include {
    /// Wire name of this field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Embeddings => "embeddings",
            Self::Metadatas => "metadatas",
            Self::Distances => "distances",
            Self::Uris => "uris",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for Include {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which vector a record reconstructed from a query result carries.
///
/// `QueryVector` reproduces the long-standing behavior of echoing the query
/// vector into every result. `Stored` asks the backend for the stored vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordEmbedding {
    #[default]
    #[serde(rename = "query")]
    QueryVector,
    Stored,
    Omitted,
}

/// A nearest-neighbour query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestQuery {
    /// Query vector
    pub embedding: Embedding,
    /// Maximum number of results
    pub limit: usize,
    /// Accepted for contract compatibility; not applied by any store
    pub min_relevance_score: f64,
    /// Vector carried by reconstructed records
    pub record_embedding: RecordEmbedding,
}

impl NearestQuery {
    /// Query for the `limit` nearest records to `embedding`.
    #[must_use]
    pub fn new(embedding: Embedding, limit: usize) -> Self {
        Self {
            embedding,
            limit,
            min_relevance_score: 0.0,
            record_embedding: RecordEmbedding::default(),
        }
    }

    #[must_use]
    pub fn with_record_embedding(mut self, record_embedding: RecordEmbedding) -> Self {
        self.record_embedding = record_embedding;
        self
    }

    /// Payload fields to request from the backend.
    #[must_use]
    pub fn include(&self) -> Vec<Include> {
        let mut include = vec![Include::Metadatas, Include::Documents, Include::Distances];
        if self.record_embedding == RecordEmbedding::Stored {
            include.push(Include::Embeddings);
        }
        include
    }
}

/// A retrieved record and its distance to the query (lower is closer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub record: MemoryRecord,
    pub distance: f32,
}

// ============================================================================
// Chat
// ============================================================================

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Ordered, append-only conversation of a single session.
///
/// Turns are never reordered or removed; the transcript lives as long as the
/// session loop that owns it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn.
    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn add_system_message(&mut self, content: impl Into<String>) {
        self.push(ChatTurn::system(content));
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.push(ChatTurn::user(content));
    }

    pub fn add_assistant_message(&mut self, content: impl Into<String>) {
        self.push(ChatTurn::assistant(content));
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChatTurn> {
        self.turns.iter()
    }

    /// System turns in transcript order.
    pub fn system_turns(&self) -> impl Iterator<Item = &ChatTurn> {
        self.turns.iter().filter(|turn| turn.role == Role::System)
    }

    #[must_use]
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a ChatTurn;
    type IntoIter = std::slice::Iter<'a, ChatTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

// ============================================================================
// Models
// ============================================================================

/// A model present in a backend's local registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

/// One progress event from a model pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullProgress {
    /// Status phrase reported by the backend
    pub status: String,
    /// Bytes completed for the current layer
    pub completed: u64,
    /// Total bytes for the current layer (0 if unknown)
    pub total: u64,
}

impl PullProgress {
    pub fn new(status: impl Into<String>, completed: u64, total: u64) -> Self {
        Self {
            status: status.into(),
            completed,
            total,
        }
    }

    /// Completion percentage of the current layer, 0 when the total is unknown.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.completed as f64 * 100.0 / self.total as f64).min(100.0)
        }
    }

    /// Whether this event marks the end of a successful pull.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }
}
