//! Offline embedding backend.
//!
//! [`NoopBackend`] answers every embedding request with zero vectors and
//! reports a single local model, so an [`EmbeddingProvider`](crate::EmbeddingProvider)
//! can run without a model server.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use ragloop_core::{
    EmbedError, EmbeddingBackend, ModelInfo, ModelRegistry, ProvisionError, PullProgress,
};
use tokio_util::sync::CancellationToken;

/// Backend returning zero vectors of a fixed dimension.
#[derive(Debug, Clone)]
pub struct NoopBackend {
    dimension: usize,
    model: String,
}

impl NoopBackend {
    /// Zero vectors of dimension 384 under the model name `noop`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dimension(384)
    }

    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            model: "noop".to_string(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Default for NoopBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRegistry for NoopBackend {
    async fn list_local_models(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<Vec<ModelInfo>, ProvisionError> {
        Ok(vec![ModelInfo {
            name: self.model.clone(),
        }])
    }

    fn pull_model<'a>(
        &'a self,
        _model: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<PullProgress, ProvisionError>> {
        futures::stream::once(async { Ok(PullProgress::new("success", 0, 0)) }).boxed()
    }
}

#[async_trait]
impl EmbeddingBackend for NoopBackend {
    async fn embed(
        &self,
        _model: &str,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f64>>, EmbedError> {
        if cancel.is_cancelled() {
            return Err(EmbedError::Cancelled);
        }
        Ok(inputs.iter().map(|_| vec![0.0; self.dimension]).collect())
    }
}
