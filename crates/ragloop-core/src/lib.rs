//! # ragloop-core
//!
//! Core types and traits for ragloop, a minimal retrieval-augmented generation
//! loop: split a document into chunks, embed them, keep them in a vector
//! collection, and ground a streamed chat answer in the nearest chunks.
//!
//! ## Architecture
//!
//! ```text
//! Seed:   text → Chunker → Embedder → VectorStore
//! Query:  question → Embedder → VectorStore (top-k) → grounding turns
//!                                                    ↓
//!                                  ChatHandle ← Transcript → streamed reply
//! ```
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Chunker`] | Split document text into bounded chunks |
//! | [`ModelRegistry`] | List and pull models on a model backend |
//! | [`EmbeddingBackend`] | Raw embedding endpoint |
//! | [`Embedder`] | Embedding provider with model provisioning |
//! | [`VectorStore`] | Collections, upsert and nearest-neighbour queries |
//! | [`ChatHandle`] | Stateful conversation on a chat backend |
//!
//! ## Related Crates
//!
//! - `ragloop-chunker`: Line chunker
//! - `ragloop-ollama`: HTTP client for the model backend
//! - `ragloop-embed`: Embedding provider
//! - `ragloop-store`: Vector store over Chroma or memory
//! - `ragloop-chat`: Chat session state machine
//! - `ragloop-query`: Retrieval and the ingest/ask pipeline

pub mod error;
pub mod provision;
pub mod traits;
pub mod types;

pub use error::{
    BackendError, CallError, ChatError, ChunkError, EmbedError, Error, ProvisionError, Result,
    StoreError, StoreOp,
};
pub use provision::{ModelPresence, ProvisionUpdate, Provisioned, ensure_model};
pub use traits::*;
pub use types::*;
