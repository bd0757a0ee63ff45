//! Wire-level vector backend contract.
//!
//! Backends address collections by id and exchange parallel arrays, the way
//! Chroma's HTTP API does. Name resolution and record reconstruction live in
//! [`CollectionStore`](crate::CollectionStore).

use async_trait::async_trait;
use ragloop_core::{Embedding, Include, StoreError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Free-form metadata attached to a stored vector.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A collection as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
}

/// Parallel arrays for one upsert call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub ids: Vec<String>,
    pub embeddings: Vec<Embedding>,
    pub metadatas: Vec<Metadata>,
    pub documents: Vec<String>,
}

impl UpsertRequest {
    /// Request for a single vector.
    pub fn single(id: String, embedding: Embedding, metadata: Metadata, document: String) -> Self {
        Self {
            ids: vec![id],
            embeddings: vec![embedding],
            metadatas: vec![metadata],
            documents: vec![document],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Query result: one row per query embedding, fields present per `include`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<Embedding>>>,
}

/// One neighbour of a single-vector query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: String,
    pub distance: Option<f32>,
    pub metadata: Option<Metadata>,
    pub document: Option<String>,
    pub embedding: Option<Embedding>,
}

impl QueryResponse {
    /// Hits of the first query row, in backend order.
    #[must_use]
    pub fn into_hits(self) -> Vec<QueryHit> {
        let Some(ids) = self.ids.into_iter().next() else {
            return Vec::new();
        };
        let mut distances = first_row(self.distances).into_iter();
        let mut metadatas = first_row(self.metadatas).into_iter();
        let mut documents = first_row(self.documents).into_iter();
        let mut embeddings = first_row(self.embeddings).into_iter();

        ids.into_iter()
            .map(|id| QueryHit {
                id,
                distance: distances.next(),
                metadata: metadatas.next().flatten(),
                document: documents.next().flatten(),
                embedding: embeddings.next(),
            })
            .collect()
    }
}

fn first_row<T>(rows: Option<Vec<Vec<T>>>) -> Vec<T> {
    rows.and_then(|rows| rows.into_iter().next())
        .unwrap_or_default()
}

/// A vector database addressed by collection id.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Look a collection up by name. `None` when it does not exist.
    async fn get_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CollectionInfo>, StoreError>;

    async fn create_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionInfo, StoreError>;

    async fn delete_collection(&self, name: &str, cancel: &CancellationToken)
    -> Result<(), StoreError>;

    /// All collections, in backend order.
    async fn list_collections(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CollectionInfo>, StoreError>;

    /// Insert or replace vectors by id.
    async fn upsert(
        &self,
        collection_id: &str,
        request: UpsertRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError>;

    /// Nearest neighbours of each query embedding.
    async fn query(
        &self,
        collection_id: &str,
        query_embeddings: Vec<Embedding>,
        n_results: usize,
        include: &[Include],
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chroma_query_response_into_hits() {
        let response: QueryResponse = serde_json::from_str(
            r#"{
                "ids": [["0", "1"]],
                "distances": [[0.0, 1.5]],
                "metadatas": [[{"text": "Line A. Line B."}, null]],
                "documents": [["Line A. Line B.", "Line C."]],
                "embeddings": null,
                "uris": null,
                "data": null,
                "included": ["metadatas", "documents", "distances"]
            }"#,
        )
        .unwrap();

        let hits = response.into_hits();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "0");
        assert_eq!(hits[0].distance, Some(0.0));
        assert_eq!(hits[0].metadata.as_ref().unwrap()["text"], "Line A. Line B.");
        assert_eq!(hits[1].metadata, None);
        assert_eq!(hits[1].document.as_deref(), Some("Line C."));
        assert_eq!(hits[1].embedding, None);
    }

    #[test]
    fn test_empty_response_has_no_hits() {
        assert!(QueryResponse::default().into_hits().is_empty());
        let response: QueryResponse = serde_json::from_str(r#"{"ids": [[]]}"#).unwrap();
        assert!(response.into_hits().is_empty());
    }
}
