//! Error types for ragloop.

use thiserror::Error;

/// Main error type for ragloop operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Chunking failed
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkError),

    /// Embedding generation failed
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbedError),

    /// Vector store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Chat completion failed
    #[error("chat error: {0}")]
    Chat(#[from] ChatError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

/// Failure talking to a remote collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection could not be established or was lost
    #[error("backend unavailable at {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },

    /// Backend answered with a non-success status
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Backend answered with a body we could not decode
    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// A cancellable backend call that did not complete.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("call cancelled")]
    Cancelled,
}

/// Model provisioning errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    /// Backend could not fetch or validate the model
    #[error("failed to provision model {model}: {reason}")]
    Failed { model: String, reason: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("model provisioning cancelled")]
    Cancelled,
}

impl ProvisionError {
    pub fn failed(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

/// Chunking errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("failed to provision model {model}: {reason}")]
    Provisioning { model: String, reason: String },

    /// Backend returned no vectors for a non-empty batch
    #[error("backend returned no embeddings for {inputs} inputs")]
    EmptyEmbedding { inputs: usize },

    #[error("backend returned {actual} embeddings for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("embedding cancelled")]
    Cancelled,
}

/// Vector store operation, used for error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    CreateCollection,
    DeleteCollection,
    GetCollection,
    ListCollections,
    Upsert,
    Query,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CreateCollection => "create collection",
            Self::DeleteCollection => "delete collection",
            Self::GetCollection => "get collection",
            Self::ListCollections => "list collections",
            Self::Upsert => "upsert",
            Self::Query => "query",
        };
        f.write_str(name)
    }
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Collection name did not resolve; collections are never auto-created
    #[error("couldn't find a collection named {collection}")]
    CollectionNotFound { collection: String },

    /// Backend rejected the call
    #[error("{operation} on collection {collection} rejected: {reason}")]
    Rejected {
        collection: String,
        operation: StoreOp,
        reason: String,
    },

    #[error("record {id} in collection {collection} has no embedding")]
    MissingEmbedding { collection: String, id: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("store operation cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn rejected(
        collection: impl Into<String>,
        operation: StoreOp,
        reason: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            collection: collection.into(),
            operation,
            reason: reason.into(),
        }
    }
}

/// Chat errors.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("failed to provision model {model}: {reason}")]
    Provisioning { model: String, reason: String },

    #[error("transcript has no turn to answer")]
    EmptyTranscript,

    /// Backend reported an error inside the reply stream
    #[error("chat backend error: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("chat cancelled")]
    Cancelled,
}

impl From<CallError> for ProvisionError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Backend(err) => Self::Backend(err),
            CallError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<CallError> for EmbedError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Backend(err) => Self::Backend(err),
            CallError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<CallError> for StoreError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Backend(err) => Self::Backend(err),
            CallError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<CallError> for ChatError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Backend(err) => Self::Backend(err),
            CallError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<ProvisionError> for EmbedError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Failed { model, reason } => Self::Provisioning { model, reason },
            ProvisionError::Backend(err) => Self::Backend(err),
            ProvisionError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<ProvisionError> for ChatError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Failed { model, reason } => Self::Provisioning { model, reason },
            ProvisionError::Backend(err) => Self::Backend(err),
            ProvisionError::Cancelled => Self::Cancelled,
        }
    }
}

/// Result type alias for ragloop operations.
pub type Result<T> = std::result::Result<T, Error>;
