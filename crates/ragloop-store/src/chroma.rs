//! Chroma backend over the v1 HTTP API.

use async_trait::async_trait;
use ragloop_core::{BackendError, CallError, Embedding, Include, StoreError, StoreOp};
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{CollectionInfo, QueryResponse, UpsertRequest, VectorBackend};

/// Default address of a local Chroma server.
pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";

const COLLECTIONS: &str = "/api/v1/collections";

/// Client for one Chroma server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChromaBackend {
    http: reqwest::Client,
    base_url: String,
}

impl Default for ChromaBackend {
    fn default() -> Self {
        Self::new(DEFAULT_CHROMA_URL)
    }
}

#[derive(Serialize)]
struct CreateCollection<'a> {
    name: &'a str,
    get_or_create: bool,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query_embeddings: Vec<Embedding>,
    n_results: usize,
    include: &'a [Include],
}

/// A non-success answer, kept apart from transport failures.
enum Failure {
    Call(CallError),
    Status { status: StatusCode, body: String },
}

impl From<CallError> for Failure {
    fn from(err: CallError) -> Self {
        Self::Call(err)
    }
}

impl Failure {
    fn into_store_error(self, collection: &str, operation: StoreOp) -> StoreError {
        match self {
            Self::Call(err) => err.into(),
            Self::Status { status, body } => {
                StoreError::rejected(collection, operation, format!("{status}: {body}"))
            }
        }
    }
}

impl ChromaBackend {
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request; the body of a successful response is returned unread.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, Failure> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CallError::Cancelled.into()),
            response = request.send() => response.map_err(|err| transport_error(endpoint, &err))?,
        };
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!("{} answered {}: {}", endpoint, status, body);
        Err(Failure::Status { status, body })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<T, Failure> {
        let response = self.send(request, endpoint, cancel).await?;
        let bytes = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CallError::Cancelled.into()),
            bytes = response.bytes() => bytes.map_err(|err| transport_error(endpoint, &err))?,
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            Failure::Call(
                BackendError::Decode {
                    endpoint: endpoint.to_string(),
                    reason: err.to_string(),
                }
                .into(),
            )
        })
    }
}

fn transport_error(endpoint: &str, err: &reqwest::Error) -> CallError {
    let reason = err.to_string();
    let endpoint = endpoint.to_string();
    if err.is_decode() {
        BackendError::Decode { endpoint, reason }.into()
    } else {
        BackendError::Unavailable { endpoint, reason }.into()
    }
}

/// Chroma reports an unknown collection either as 404 or as an error body.
fn is_missing_collection(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND || body.contains("does not exist")
}

#[async_trait]
impl VectorBackend for ChromaBackend {
    async fn get_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<CollectionInfo>, StoreError> {
        let endpoint = self.endpoint(&format!("{COLLECTIONS}/{name}"));
        match self
            .send_json::<CollectionInfo>(self.http.get(&endpoint), &endpoint, cancel)
            .await
        {
            Ok(info) => Ok(Some(info)),
            Err(Failure::Status { status, body }) if is_missing_collection(status, &body) => {
                Ok(None)
            }
            Err(failure) => Err(failure.into_store_error(name, StoreOp::GetCollection)),
        }
    }

    async fn create_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CollectionInfo, StoreError> {
        let endpoint = self.endpoint(COLLECTIONS);
        let request = self.http.post(&endpoint).json(&CreateCollection {
            name,
            get_or_create: false,
        });
        self.send_json(request, &endpoint, cancel)
            .await
            .map_err(|failure| failure.into_store_error(name, StoreOp::CreateCollection))
    }

    async fn delete_collection(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let endpoint = self.endpoint(&format!("{COLLECTIONS}/{name}"));
        self.send(self.http.delete(&endpoint), &endpoint, cancel)
            .await
            .map(drop)
            .map_err(|failure| failure.into_store_error(name, StoreOp::DeleteCollection))
    }

    async fn list_collections(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<CollectionInfo>, StoreError> {
        let endpoint = self.endpoint(COLLECTIONS);
        self.send_json(self.http.get(&endpoint), &endpoint, cancel)
            .await
            .map_err(|failure| failure.into_store_error("*", StoreOp::ListCollections))
    }

    async fn upsert(
        &self,
        collection_id: &str,
        request: UpsertRequest,
        cancel: &CancellationToken,
    ) -> Result<(), StoreError> {
        let endpoint = self.endpoint(&format!("{COLLECTIONS}/{collection_id}/upsert"));
        let http = self.http.post(&endpoint).json(&request);
        self.send(http, &endpoint, cancel)
            .await
            .map(drop)
            .map_err(|failure| failure.into_store_error(collection_id, StoreOp::Upsert))
    }

    async fn query(
        &self,
        collection_id: &str,
        query_embeddings: Vec<Embedding>,
        n_results: usize,
        include: &[Include],
        cancel: &CancellationToken,
    ) -> Result<QueryResponse, StoreError> {
        let endpoint = self.endpoint(&format!("{COLLECTIONS}/{collection_id}/query"));
        let request = self.http.post(&endpoint).json(&QueryBody {
            query_embeddings,
            n_results,
            include,
        });
        self.send_json(request, &endpoint, cancel)
            .await
            .map_err(|failure| failure.into_store_error(collection_id, StoreOp::Query))
    }
}
