//! Vector storage layer for ragloop.
//!
//! [`CollectionStore`] implements [`VectorStore`](ragloop_core::VectorStore)
//! on top of a wire-level [`VectorBackend`]: it resolves collection names to
//! backend ids, streams per-record upserts and rebuilds
//! [`MemoryRecord`](ragloop_core::MemoryRecord)s from query payloads.
//!
//! # Backends
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChromaBackend`] | Chroma server over its v1 HTTP API |
//! | [`MemoryBackend`] | In-process, brute-force squared L2 |
//!
//! # Example
//!
//! ```rust,ignore
//! use ragloop_store::{ChromaBackend, CollectionStore};
//! use ragloop_core::VectorStore;
//!
//! let store = CollectionStore::new(ChromaBackend::new("http://localhost:8000"));
//! if !store.collection_exists("embeddings", &cancel).await? {
//!     store.create_collection("embeddings", &cancel).await?;
//! }
//! let ids: Vec<String> = store
//!     .upsert_batch("embeddings", records, &cancel)
//!     .try_collect()
//!     .await?;
//! ```

pub mod backend;
pub mod chroma;
pub mod collection;
pub mod memory;
pub mod schema;

pub use backend::{CollectionInfo, Metadata, QueryHit, QueryResponse, UpsertRequest, VectorBackend};
pub use chroma::{ChromaBackend, DEFAULT_CHROMA_URL};
pub use collection::CollectionStore;
pub use memory::MemoryBackend;
