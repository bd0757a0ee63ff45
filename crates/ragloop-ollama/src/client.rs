//! HTTP client for the Ollama model registry and embedding endpoint.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use ragloop_core::{
    BackendError, CallError, EmbedError, EmbeddingBackend, ModelInfo, ModelRegistry,
    ProvisionError, PullProgress,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ndjson::NdjsonStream;
use crate::wire::{EmbedRequest, EmbedResponse, PullEvent, PullRequest, TagsResponse};

/// Default address of a local Ollama server.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Client for one Ollama server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new(DEFAULT_OLLAMA_URL)
    }
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, CallError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CallError::Cancelled),
            response = request.send() => response.map_err(|err| transport_error(endpoint, &err))?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        }
        .into())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<T, CallError> {
        let endpoint = self.endpoint(path);
        let response = self.execute(self.http.get(&endpoint), &endpoint, cancel).await?;
        read_json(&endpoint, response, cancel).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, CallError> {
        let endpoint = self.endpoint(path);
        let request = self.http.post(&endpoint).json(body);
        let response = self.execute(request, &endpoint, cancel).await?;
        read_json(&endpoint, response, cancel).await
    }

    /// POST `body` and open the streamed NDJSON reply.
    pub(crate) async fn post_ndjson<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<NdjsonStream, CallError> {
        let endpoint = self.endpoint(path);
        let request = self.http.post(&endpoint).json(body);
        let response = self.execute(request, &endpoint, cancel).await?;
        Ok(NdjsonStream::new(endpoint, response))
    }
}

async fn read_json<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<T, CallError> {
    let bytes = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(CallError::Cancelled),
        bytes = response.bytes() => bytes.map_err(|err| transport_error(endpoint, &err))?,
    };
    serde_json::from_slice(&bytes).map_err(|err| {
        BackendError::Decode {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
        .into()
    })
}

/// Map a reqwest failure to a backend error for `endpoint`.
pub(crate) fn transport_error(endpoint: &str, err: &reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::Decode {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    } else {
        BackendError::Unavailable {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ModelRegistry for OllamaClient {
    async fn list_local_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ModelInfo>, ProvisionError> {
        let tags: TagsResponse = self.get_json("/api/tags", cancel).await?;
        debug!("{} reports {} local models", self.base_url, tags.models.len());
        Ok(tags.models.into_iter().map(ModelInfo::from).collect())
    }

    fn pull_model<'a>(
        &'a self,
        model: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<PullProgress, ProvisionError>> {
        Box::pin(stream! {
            let request = PullRequest { model, stream: true };
            let mut events = match self.post_ndjson("/api/pull", &request, cancel).await {
                Ok(events) => events,
                Err(err) => {
                    yield Err(ProvisionError::from(err));
                    return;
                }
            };

            while let Some(event) = events.next::<PullEvent>(cancel).await {
                match event {
                    Ok(PullEvent { error: Some(reason), .. }) => {
                        yield Err(ProvisionError::failed(model, reason));
                        return;
                    }
                    Ok(event) => yield Ok(PullProgress::from(event)),
                    Err(err) => {
                        yield Err(ProvisionError::from(err));
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaClient {
    async fn embed(
        &self,
        model: &str,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f64>>, EmbedError> {
        let request = EmbedRequest { model, input: inputs };
        let response: EmbedResponse = self.post_json("/api/embed", &request, cancel).await?;
        debug!(
            "Embedded {} inputs with {} ({} vectors)",
            inputs.len(),
            model,
            response.embeddings.len()
        );
        Ok(response.embeddings)
    }
}
