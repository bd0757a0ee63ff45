//! Embedding provider over a model backend.

use std::sync::Arc;

use async_trait::async_trait;
use ragloop_core::{
    EmbedError, Embedder, Embedding, EmbeddingBackend, ModelPresence, ProvisionUpdate,
    ensure_model,
};
use tokio::sync::{OnceCell, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the provisioning progress channel.
const PROGRESS_CAPACITY: usize = 64;

/// Embeds text with one model, pulling the model on first use.
///
/// The registry check runs once per provider; later calls go straight to the
/// backend.
pub struct EmbeddingProvider {
    backend: Arc<dyn EmbeddingBackend>,
    model: String,
    ready: OnceCell<()>,
    updates: broadcast::Sender<ProvisionUpdate>,
}

impl EmbeddingProvider {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, model: impl Into<String>) -> Self {
        let (updates, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            backend,
            model: model.into(),
            ready: OnceCell::new(),
            updates,
        }
    }

    /// Subscribe to model pull progress.
    pub fn subscribe(&self) -> broadcast::Receiver<ProvisionUpdate> {
        self.updates.subscribe()
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn ensure_model_available(&self, cancel: &CancellationToken) -> Result<(), EmbedError> {
        self.ready
            .get_or_try_init(|| async {
                let outcome = ensure_model(
                    self.backend.as_ref(),
                    &self.model,
                    ModelPresence::Named,
                    Some(&self.updates),
                    cancel,
                )
                .await?;
                info!("Embedding model {} ready ({:?})", self.model, outcome);
                Ok::<_, EmbedError>(())
            })
            .await?;
        Ok(())
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Embedding>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_model_available(cancel).await?;

        let vectors = self.backend.embed(&self.model, texts, cancel).await?;
        if vectors.is_empty() || vectors.iter().any(Vec::is_empty) {
            return Err(EmbedError::EmptyEmbedding {
                inputs: texts.len(),
            });
        }
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }

        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(vectors.into_iter().map(narrow).collect())
    }
}

fn narrow(vector: Vec<f64>) -> Embedding {
    vector.into_iter().map(|v| v as f32).collect()
}
