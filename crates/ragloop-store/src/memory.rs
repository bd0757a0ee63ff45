//! In-memory vector backend.
//!
//! [`MemoryBackend`] keeps collections in process and answers queries by
//! brute force. It's useful for:
//! - Tests and benches without a Chroma server
//! - Offline runs where nothing needs to outlive the process

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ragloop_core::{Embedding, Include, StoreError, StoreOp};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{CollectionInfo, Metadata, QueryResponse, UpsertRequest, VectorBackend};

struct StoredVector {
    id: String,
    embedding: Embedding,
    metadata: Metadata,
    document: String,
}

struct MemoryCollection {
    info: CollectionInfo,
    dimension: Option<usize>,
    vectors: Vec<StoredVector>,
}

/// In-memory vector backend using squared Euclidean distance.
///
/// Collections and the vectors inside them keep insertion order, so equal
/// distances come back in the order the vectors were first stored.
#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<Vec<MemoryCollection>>,
    next_id: AtomicU64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vectors in the collection named `name`.
    pub async fn count(&self, name: &str) -> Option<usize> {
        let collections = self.collections.read().await;
        collections
            .iter()
            .find(|c| c.info.name == name)
            .map(|c| c.vectors.len())
    }

    /// Squared L2 distance between two vectors.
    fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), StoreError> {
    if cancel.is_cancelled() {
        Err(StoreError::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn get_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CollectionInfo>, StoreError> {
        check_cancel(cancel)?;
        let collections = self.collections.read().await;
        Ok(collections
            .iter()
            .find(|c| c.info.name == name)
            .map(|c| c.info.clone()))
    }

    async fn create_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionInfo, StoreError> {
        check_cancel(cancel)?;
        let mut collections = self.collections.write().await;
        if collections.iter().any(|c| c.info.name == name) {
            return Err(StoreError::rejected(
                name,
                StoreOp::CreateCollection,
                "collection already exists",
            ));
        }
        let info = CollectionInfo {
            id: format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed)),
            name: name.to_string(),
        };
        collections.push(MemoryCollection {
            info: info.clone(),
            dimension: None,
            vectors: Vec::new(),
        });
        debug!("Created in-memory collection {} ({})", name, info.id);
        Ok(info)
    }

    async fn delete_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancel(cancel)?;
        let mut collections = self.collections.write().await;
        let before = collections.len();
        collections.retain(|c| c.info.name != name);
        if collections.len() == before {
            return Err(StoreError::rejected(
                name,
                StoreOp::DeleteCollection,
                "collection does not exist",
            ));
        }
        debug!("Deleted in-memory collection {}", name);
        Ok(())
    }

    async fn list_collections(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CollectionInfo>, StoreError> {
        check_cancel(cancel)?;
        let collections = self.collections.read().await;
        Ok(collections.iter().map(|c| c.info.clone()).collect())
    }

    async fn upsert(
        &self,
        collection_id: &str,
        request: UpsertRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        check_cancel(cancel)?;
        let UpsertRequest {
            ids,
            embeddings,
            metadatas,
            documents,
        } = request;
        if embeddings.len() != ids.len()
            || metadatas.len() != ids.len()
            || documents.len() != ids.len()
        {
            return Err(StoreError::rejected(
                collection_id,
                StoreOp::Upsert,
                "ids, embeddings, metadatas and documents differ in length",
            ));
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.write().await;
        let collection = collections
            .iter_mut()
            .find(|c| c.info.id == collection_id)
            .ok_or_else(|| {
                StoreError::rejected(collection_id, StoreOp::Upsert, "unknown collection id")
            })?;

        let dimension = *collection
            .dimension
            .get_or_insert_with(|| embeddings.first().map_or(0, Vec::len));
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(StoreError::rejected(
                collection_id,
                StoreOp::Upsert,
                format!(
                    "embedding dimension {} does not match collection dimensionality {}",
                    bad.len(),
                    dimension
                ),
            ));
        }

        let count = ids.len();
        for (((id, embedding), metadata), document) in
            ids.into_iter().zip(embeddings).zip(metadatas).zip(documents)
        {
            let vector = StoredVector {
                id,
                embedding,
                metadata,
                document,
            };
            match collection.vectors.iter_mut().find(|v| v.id == vector.id) {
                Some(existing) => *existing = vector,
                None => collection.vectors.push(vector),
            }
        }
        debug!("Upserted {} vectors into {}", count, collection.info.name);
        Ok(())
    }

    async fn query(
        &self,
        collection_id: &str,
        query_embeddings: Vec<Embedding>,
        n_results: usize,
        include: &[Include],
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, StoreError> {
        check_cancel(cancel)?;
        let collections = self.collections.read().await;
        let collection = collections
            .iter()
            .find(|c| c.info.id == collection_id)
            .ok_or_else(|| {
                StoreError::rejected(collection_id, StoreOp::Query, "unknown collection id")
            })?;

        let wants = |field: Include| include.contains(&field);
        let mut response = QueryResponse {
            ids: Vec::new(),
            distances: wants(Include::Distances).then(Vec::new),
            metadatas: wants(Include::Metadatas).then(Vec::new),
            documents: wants(Include::Documents).then(Vec::new),
            embeddings: wants(Include::Embeddings).then(Vec::new),
        };

        for query in &query_embeddings {
            if let Some(dimension) = collection.dimension {
                if query.len() != dimension {
                    return Err(StoreError::rejected(
                        &collection.info.name,
                        StoreOp::Query,
                        format!(
                            "query dimension {} does not match collection dimensionality {}",
                            query.len(),
                            dimension
                        ),
                    ));
                }
            }

            let mut scored: Vec<(f32, &StoredVector)> = collection
                .vectors
                .iter()
                .map(|v| (Self::squared_l2(query, &v.embedding), v))
                .collect();
            // Stable sort keeps insertion order on ties
            scored.sort_by(|a, b| a.0.total_cmp(&b.0));
            scored.truncate(n_results);

            response
                .ids
                .push(scored.iter().map(|(_, v)| v.id.clone()).collect());
            if let Some(rows) = response.distances.as_mut() {
                rows.push(scored.iter().map(|(d, _)| *d).collect());
            }
            if let Some(rows) = response.metadatas.as_mut() {
                rows.push(scored.iter().map(|(_, v)| Some(v.metadata.clone())).collect());
            }
            if let Some(rows) = response.documents.as_mut() {
                rows.push(scored.iter().map(|(_, v)| Some(v.document.clone())).collect());
            }
            if let Some(rows) = response.embeddings.as_mut() {
                rows.push(scored.iter().map(|(_, v)| v.embedding.clone()).collect());
            }
        }

        debug!(
            "Queried {} with {} vectors (n_results {})",
            collection.info.name,
            query_embeddings.len(),
            n_results
        );
        Ok(response)
    }
}
