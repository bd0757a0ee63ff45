//! The ingest and ask pipeline.
//!
//! Ingest: document → chunk → embed → store.
//! Ask: question → retrieve → grounding turns → streamed answer.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use ragloop_chat::ChatSession;
use ragloop_core::{
    Chunker, Embedder, Error, FragmentStream, MemoryRecord, RecordEmbedding, RetrievalResult,
    Transcript, VectorStore,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::retriever::Retriever;

/// Text placed before every grounding chunk sent to the chat model.
pub const DEFAULT_GROUNDING_PREFIX: &str =
    "Here's what you know regarding the question that was asked: ";

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Number of chunks the document was split into
    pub chunks: usize,
    /// Ids the store confirmed, in upsert order
    pub upserted_ids: Vec<String>,
}

/// A grounded answer in flight.
pub struct Answer<'a> {
    /// Retrieved records, nearest first
    pub grounding: Vec<RetrievalResult>,
    /// Reply fragments; the Assistant turn is committed when this completes
    pub fragments: FragmentStream<'a>,
}

/// Wires chunker, embedder and store into the two driver operations.
pub struct RagPipeline {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    retriever: Retriever,
    grounding_prefix: String,
}

impl RagPipeline {
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            retriever: Retriever::new(store.clone(), embedder.clone()),
            chunker,
            embedder,
            store,
            grounding_prefix: DEFAULT_GROUNDING_PREFIX.to_string(),
        }
    }

    #[must_use]
    pub fn with_grounding_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.grounding_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_record_embedding(mut self, record_embedding: RecordEmbedding) -> Self {
        self.retriever = self.retriever.with_record_embedding(record_embedding);
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Read `path` and ingest its text into `collection`.
    pub async fn ingest_document(
        &self,
        path: &Path,
        chunk_size: usize,
        collection: &str,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, Error> {
        let text = tokio::fs::read_to_string(path).await?;
        debug!("Read {} bytes from {:?}", text.len(), path);
        let report = self
            .ingest_text(&text, chunk_size, collection, description, cancel)
            .await?;
        info!(
            "Ingested {:?} into {} ({} chunks)",
            path, collection, report.chunks
        );
        Ok(report)
    }

    /// Split, embed and upsert `text`, creating `collection` if needed.
    ///
    /// Record ids are the chunk indices, so re-ingesting the same text
    /// replaces the earlier records instead of duplicating them.
    pub async fn ingest_text(
        &self,
        text: &str,
        chunk_size: usize,
        collection: &str,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, Error> {
        let chunks = self.chunker.split(text, chunk_size)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts, cancel).await?;

        let now = Utc::now();
        let records: Vec<MemoryRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                MemoryRecord::local(
                    chunk.record_id(),
                    chunk.text.clone(),
                    description,
                    Some(embedding),
                    now,
                )
            })
            .collect();

        if !self.store.collection_exists(collection, cancel).await? {
            debug!("Collection {} missing, creating it", collection);
            self.store.create_collection(collection, cancel).await?;
        }

        let upserted_ids: Vec<String> = self
            .store
            .upsert_batch(collection, records, cancel)
            .try_collect()
            .await?;

        Ok(IngestReport {
            chunks: chunks.len(),
            upserted_ids,
        })
    }

    /// Ground `query` in the `k` nearest chunks and start the answer.
    ///
    /// One System turn per retrieved chunk and the User turn are appended to
    /// `transcript` before the completion starts.
    pub async fn ask_question<'a>(
        &self,
        session: &'a mut ChatSession,
        transcript: &'a mut Transcript,
        query: &str,
        collection: &str,
        k: usize,
        cancel: &'a CancellationToken,
    ) -> Result<Answer<'a>, Error> {
        let grounding = self.retriever.retrieve(query, collection, k, cancel).await?;
        for result in &grounding {
            transcript
                .add_system_message(format!("{}{}", self.grounding_prefix, result.record.text));
        }
        transcript.add_user_message(query);
        debug!(
            "Asking with {} grounding turns ({} turns total)",
            grounding.len(),
            transcript.len()
        );

        Ok(Answer {
            grounding,
            fragments: session.complete_streaming(transcript, cancel),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::tests::ShapeEmbedder;
    use async_stream::stream;
    use async_trait::async_trait;
    use futures::StreamExt;
    use futures::stream::BoxStream;
    use ragloop_chunker::LineChunker;
    use ragloop_core::{
        ChatError, ChatHandle, ModelInfo, ModelRegistry, ProvisionError, PullProgress, Role,
        StoreError,
    };
    use ragloop_store::{CollectionStore, MemoryBackend};
    use std::sync::Mutex;

    fn pipeline() -> RagPipeline {
        RagPipeline::new(
            Arc::new(LineChunker::new()),
            Arc::new(ShapeEmbedder),
            Arc::new(CollectionStore::new(MemoryBackend::new())),
        )
    }

    struct Populated;

    #[async_trait]
    impl ModelRegistry for Populated {
        async fn list_local_models(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ModelInfo>, ProvisionError> {
            Ok(vec![ModelInfo {
                name: "llama3.2:1b".to_string(),
            }])
        }

        fn pull_model<'a>(
            &'a self,
            _model: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxStream<'a, Result<PullProgress, ProvisionError>> {
            futures::stream::empty().boxed()
        }
    }

    struct EchoHandle {
        sent: Arc<Mutex<Vec<(Role, String)>>>,
    }

    impl ChatHandle for EchoHandle {
        fn model(&self) -> &str {
            "llama3.2:1b"
        }

        fn select_model(&mut self, _model: &str) {}

        fn send_as<'a>(
            &'a mut self,
            role: Role,
            content: &'a str,
            _cancel: &'a CancellationToken,
        ) -> FragmentStream<'a> {
            self.sent.lock().unwrap().push((role, content.to_string()));
            Box::pin(stream! {
                yield Ok::<_, ChatError>("Seen: ".to_string());
                yield Ok(content.to_string());
            })
        }
    }

    #[tokio::test]
    async fn test_ingest_text_creates_collection_and_upserts() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();

        let report = pipeline
            .ingest_text("Line A.\nLine B.\nLine C.", 2, "embeddings", "test", &cancel)
            .await
            .unwrap();

        assert_eq!(report.chunks, 2);
        assert_eq!(report.upserted_ids, vec!["0".to_string(), "1".to_string()]);
        assert!(pipeline.store().collection_exists("embeddings", &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_reingest_replaces_records() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();
        let text = "Line A.\nLine B.\nLine C.";

        pipeline.ingest_text(text, 2, "embeddings", "test", &cancel).await.unwrap();
        pipeline.ingest_text(text, 2, "embeddings", "test", &cancel).await.unwrap();

        let results = pipeline
            .retriever()
            .retrieve("Line C.", "embeddings", 10, &cancel)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_document_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds9.txt");
        tokio::fs::write(&path, "Odo is a changeling.\n\nQuark runs the bar.\n")
            .await
            .unwrap();

        let report = pipeline()
            .ingest_document(&path, 40, "embeddings", "test", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.chunks, 1);
    }

    #[tokio::test]
    async fn test_ingest_missing_document() {
        let err = pipeline()
            .ingest_document(
                Path::new("/nonexistent/ds9.txt"),
                40,
                "embeddings",
                "test",
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_ask_question_grounds_and_streams() {
        let pipeline = pipeline().with_grounding_prefix("Fact: ");
        let cancel = CancellationToken::new();
        pipeline
            .ingest_text("Line A.\nLine B.\nLine C.", 2, "embeddings", "test", &cancel)
            .await
            .unwrap();

        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut session = ChatSession::new(
            Arc::new(Populated),
            Box::new(EchoHandle { sent: sent.clone() }),
        );
        let mut transcript = Transcript::new();

        {
            let answer = pipeline
                .ask_question(&mut session, &mut transcript, "Line C.", "embeddings", 1, &cancel)
                .await
                .unwrap();
            assert_eq!(answer.grounding.len(), 1);
            assert_eq!(answer.grounding[0].record.text, "Line C.");

            let reply: Vec<String> = answer.fragments.try_collect().await.unwrap();
            assert_eq!(reply.concat(), "Seen: Line C.");
        }

        let roles: Vec<Role> = transcript.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(transcript.turns()[0].content, "Fact: Line C.");

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0], (Role::System, "Fact: Line C.".to_string()));
        assert_eq!(sent[1], (Role::User, "Line C.".to_string()));
    }

    #[tokio::test]
    async fn test_default_grounding_prefix_is_neutral() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();
        pipeline
            .ingest_text("Line A.", 40, "embeddings", "test", &cancel)
            .await
            .unwrap();

        let mut session = ChatSession::new(
            Arc::new(Populated),
            Box::new(EchoHandle {
                sent: Arc::default(),
            }),
        );
        let mut transcript = Transcript::new();
        let answer = pipeline
            .ask_question(&mut session, &mut transcript, "Line A.", "embeddings", 1, &cancel)
            .await
            .unwrap();
        drop(answer);

        let grounding = &transcript.turns()[0].content;
        assert_eq!(grounding, &format!("{DEFAULT_GROUNDING_PREFIX}Line A."));
        assert!(!DEFAULT_GROUNDING_PREFIX.contains("Don Ni"));
    }

    #[tokio::test]
    async fn test_ask_question_unknown_collection_leaves_transcript() {
        let mut session = ChatSession::new(
            Arc::new(Populated),
            Box::new(EchoHandle {
                sent: Arc::default(),
            }),
        );
        let mut transcript = Transcript::new();

        let cancel = CancellationToken::new();
        {
            let result = pipeline()
                .ask_question(
                    &mut session,
                    &mut transcript,
                    "Who is Odo?",
                    "missing",
                    3,
                    &cancel,
                )
                .await;

            assert!(matches!(
                result,
                Err(Error::Store(StoreError::CollectionNotFound { .. }))
            ));
        }
        assert!(transcript.is_empty());
    }
}
