//! Nearest-chunk retrieval.

use std::sync::Arc;

use futures::TryStreamExt;
use ragloop_core::{Embedder, Error, NearestQuery, RecordEmbedding, RetrievalResult, VectorStore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Embeds a question and queries a collection for its nearest records.
///
/// Results keep the store's order. Nothing is filtered or re-ranked, so a
/// caller wanting a relevance cut-off applies it to the returned distances.
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    record_embedding: RecordEmbedding,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            record_embedding: RecordEmbedding::default(),
        }
    }

    /// Which vector retrieved records carry.
    #[must_use]
    pub fn with_record_embedding(mut self, record_embedding: RecordEmbedding) -> Self {
        self.record_embedding = record_embedding;
        self
    }

    /// The `k` records of `collection` nearest to `query`.
    pub async fn retrieve(
        &self,
        query: &str,
        collection: &str,
        k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<RetrievalResult>, Error> {
        debug!("Retrieving {} nearest to {:?} from {}", k, query, collection);

        let embedding = self.embedder.embed_one(query, cancel).await?;
        let nearest = NearestQuery::new(embedding, k).with_record_embedding(self.record_embedding);
        let results: Vec<RetrievalResult> = self
            .store
            .query_nearest(collection, nearest, cancel)
            .try_collect()
            .await?;

        debug!("Found {} results", results.len());
        Ok(results)
    }
}

/// Record texts of `results`, in order.
#[must_use]
pub fn grounding_texts(results: &[RetrievalResult]) -> Vec<String> {
    results.iter().map(|r| r.record.text.clone()).collect()
}
