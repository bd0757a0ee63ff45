//! # ragloop-embed
//!
//! Embedding generation for ragloop.
//!
//! [`EmbeddingProvider`] wraps any [`EmbeddingBackend`](ragloop_core::EmbeddingBackend)
//! and makes sure the configured model is present before the first call,
//! pulling it when the backend does not have it yet.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ragloop_embed::EmbeddingProvider;
//! use ragloop_ollama::OllamaClient;
//! use std::sync::Arc;
//!
//! let provider = EmbeddingProvider::new(Arc::new(OllamaClient::default()), "all-minilm");
//! let mut progress = provider.subscribe();
//! let vectors = provider.embed_batch(&texts, &cancel).await?;
//! ```
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EmbeddingProvider`] | Provisioning, batching and narrowing to `f32` |
//! | [`NoopBackend`] | Offline backend returning zero vectors |

pub mod noop;
pub mod provider;

pub use noop::NoopBackend;
pub use provider::EmbeddingProvider;
