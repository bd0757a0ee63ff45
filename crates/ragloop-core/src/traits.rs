//! Core traits for ragloop components.
//!
//! - [`Chunker`]: Split document text into chunks
//! - [`ModelRegistry`]: List and pull models on a model backend
//! - [`EmbeddingBackend`]: Raw embedding endpoint of a model backend
//! - [`Embedder`]: Embedding provider with on-demand model provisioning
//! - [`VectorStore`]: Collection-oriented vector storage and similarity search
//! - [`ChatHandle`]: A stateful conversation on a chat backend
//!
//! Every call that reaches a remote collaborator takes a
//! [`CancellationToken`]; cancelling it aborts the in-flight request.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, ChunkError, EmbedError, ProvisionError, StoreError};
use crate::types::{
    Chunk, Embedding, MemoryRecord, ModelInfo, NearestQuery, PullProgress, RetrievalResult, Role,
};

/// Stream of reply fragments from a chat backend.
pub type FragmentStream<'a> = BoxStream<'a, Result<String, ChatError>>;

// ============================================================================
// Chunking
// ============================================================================

/// Trait for splitting document text into chunks.
pub trait Chunker: Send + Sync {
    /// Name of this chunking strategy.
    fn name(&self) -> &str;

    /// Split `text` into chunks of at most `max_units` units each.
    ///
    /// A single line longer than the limit forms its own chunk.
    fn split(&self, text: &str, max_units: usize) -> Result<Vec<Chunk>, ChunkError>;
}

// ============================================================================
// Models
// ============================================================================

/// Local model registry of a model backend.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Models already present on the backend.
    async fn list_local_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModelInfo>, ProvisionError>;

    /// Download a model, streaming progress until the pull completes.
    fn pull_model<'a>(
        &'a self,
        model: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<PullProgress, ProvisionError>>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Raw embedding endpoint of a model backend.
#[async_trait]
pub trait EmbeddingBackend: ModelRegistry {
    /// Embed `inputs` with `model`, one vector per input.
    async fn embed(
        &self,
        model: &str,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f64>>, EmbedError>;
}

/// Trait for generating embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name/identifier.
    fn model_name(&self) -> &str;

    /// Make sure the model is present on the backend, pulling it if needed.
    async fn ensure_model_available(&self, cancel: &CancellationToken) -> Result<(), EmbedError>;

    /// Embed a batch of texts, one vector per input in input order.
    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, EmbedError>;

    /// Embed a single text.
    async fn embed_one(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Embedding, EmbedError> {
        let mut results = self.embed_batch(&[text.to_string()], cancel).await?;
        results.pop().ok_or(EmbedError::EmptyEmbedding { inputs: 1 })
    }
}

// ============================================================================
// Vector Storage
// ============================================================================

/// Trait for collection-oriented vector storage and search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Whether a collection named `name` exists.
    async fn collection_exists(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError>;

    /// Create a collection. Fails if the backend rejects it (e.g. duplicate).
    async fn create_collection(&self, name: &str, cancel: &CancellationToken)
    -> Result<(), StoreError>;

    /// Delete a collection.
    async fn delete_collection(&self, name: &str, cancel: &CancellationToken)
    -> Result<(), StoreError>;

    /// Names of all collections.
    fn list_collections<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<String, StoreError>>;

    /// Upsert records one at a time, yielding each id once it is stored.
    ///
    /// The first failure ends the stream; ids yielded before it are the only
    /// ones guaranteed to be persisted.
    fn upsert_batch<'a>(
        &'a self,
        collection: &'a str,
        records: Vec<MemoryRecord>,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<String, StoreError>>;

    /// Nearest records to the query vector, by ascending distance.
    fn query_nearest<'a>(
        &'a self,
        collection: &'a str,
        query: NearestQuery,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<RetrievalResult, StoreError>>;

    /// The single nearest record, if the collection has any.
    async fn get_nearest_match(
        &self,
        collection: &str,
        embedding: Embedding,
        cancel: &CancellationToken,
    ) -> Result<Option<RetrievalResult>, StoreError> {
        let mut results = self.query_nearest(collection, NearestQuery::new(embedding, 1), cancel);
        results.next().await.transpose()
    }
}

// ============================================================================
// Chat
// ============================================================================

/// A stateful conversation on a chat backend.
///
/// The backend remembers every message sent through the handle, so calls
/// must be issued one at a time; `send_as` takes `&mut self` for that reason.
pub trait ChatHandle: Send {
    /// Model the handle currently talks to.
    fn model(&self) -> &str;

    /// Switch the model used for subsequent sends.
    fn select_model(&mut self, model: &str);

    /// Send a message as `role` and stream the reply fragments.
    ///
    /// The exchange is recorded in the backend conversation only when the
    /// reply stream completes.
    fn send_as<'a>(
        &'a mut self,
        role: Role,
        content: &'a str,
        cancel: &'a CancellationToken,
    ) -> FragmentStream<'a>;
}
