//! Ollama backend for ragloop.
//!
//! [`OllamaClient`] covers the model registry (`/api/tags`, `/api/pull`) and
//! the embedding endpoint (`/api/embed`). [`OllamaChat`] is a stateful chat
//! handle over `/api/chat` that keeps the conversation history client-side.

pub mod chat;
pub mod client;
mod ndjson;
mod wire;

pub use chat::OllamaChat;
pub use client::{DEFAULT_OLLAMA_URL, OllamaClient};
pub use wire::ChatMessage;
