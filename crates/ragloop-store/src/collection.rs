//! Name-addressed vector store over a [`VectorBackend`].

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use ragloop_core::{
    MemoryRecord, NearestQuery, RecordEmbedding, RetrievalResult, StoreError, StoreOp, VectorStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::{CollectionInfo, UpsertRequest, VectorBackend};
use crate::schema::{record_from_hit, record_metadata};

/// [`VectorStore`] that resolves collection names on a wire-level backend.
pub struct CollectionStore<B> {
    backend: B,
}

impl<B: VectorBackend> CollectionStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve a collection name, failing when it does not exist.
    async fn resolve(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionInfo, StoreError> {
        self.backend
            .get_collection(name, cancel)
            .await?
            .ok_or_else(|| StoreError::CollectionNotFound {
                collection: name.to_string(),
            })
    }
}

/// Report rejections against the collection name rather than its backend id.
fn named(err: StoreError, name: &str) -> StoreError {
    match err {
        StoreError::Rejected {
            operation, reason, ..
        } => StoreError::rejected(name, operation, reason),
        other => other,
    }
}

#[async_trait]
impl<B: VectorBackend> VectorStore for CollectionStore<B> {
    async fn collection_exists(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, StoreError> {
        Ok(self.backend.get_collection(name, cancel).await?.is_some())
    }

    async fn create_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let info = self.backend.create_collection(name, cancel).await?;
        info!("Created collection {} ({})", info.name, info.id);
        Ok(())
    }

    async fn delete_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.backend.delete_collection(name, cancel).await?;
        info!("Deleted collection {}", name);
        Ok(())
    }

    fn list_collections<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<String, StoreError>> {
        Box::pin(stream! {
            match self.backend.list_collections(cancel).await {
                Ok(collections) => {
                    for collection in collections {
                        yield Ok(collection.name);
                    }
                }
                Err(err) => yield Err(err),
            }
        })
    }

    fn upsert_batch<'a>(
        &'a self,
        collection: &'a str,
        records: Vec<MemoryRecord>,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<String, StoreError>> {
        Box::pin(stream! {
            let info = match self.resolve(collection, cancel).await {
                Ok(info) => info,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };

            let total = records.len();
            for record in records {
                let metadata = record_metadata(&record);
                let MemoryRecord { id, text, embedding, .. } = record;
                let Some(embedding) = embedding else {
                    yield Err(StoreError::MissingEmbedding {
                        collection: collection.to_string(),
                        id,
                    });
                    return;
                };

                let request = UpsertRequest::single(id.clone(), embedding, metadata, text);
                if let Err(err) = self.backend.upsert(&info.id, request, cancel).await {
                    yield Err(named(err, collection));
                    return;
                }
                yield Ok(id);
            }
            debug!("Upserted {} records into {}", total, collection);
        })
    }

    fn query_nearest<'a>(
        &'a self,
        collection: &'a str,
        query: NearestQuery,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<RetrievalResult, StoreError>> {
        Box::pin(stream! {
            let info = match self.resolve(collection, cancel).await {
                Ok(info) => info,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            if query.limit == 0 {
                return;
            }

            let include = query.include();
            let response = match self
                .backend
                .query(&info.id, vec![query.embedding.clone()], query.limit, &include, cancel)
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    yield Err(named(err, collection));
                    return;
                }
            };

            let hits = response.into_hits();
            debug!("Query on {} returned {} hits", collection, hits.len());
            for mut hit in hits {
                let Some(distance) = hit.distance else {
                    yield Err(StoreError::rejected(
                        collection,
                        StoreOp::Query,
                        format!("no distance returned for record {}", hit.id),
                    ));
                    return;
                };
                let embedding = match query.record_embedding {
                    RecordEmbedding::QueryVector => Some(query.embedding.clone()),
                    RecordEmbedding::Stored => hit.embedding.take(),
                    RecordEmbedding::Omitted => None,
                };
                yield Ok(RetrievalResult {
                    record: record_from_hit(hit, embedding),
                    distance,
                });
            }
        })
    }
}
