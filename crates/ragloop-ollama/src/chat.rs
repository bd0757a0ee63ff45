//! Stateful chat handle over `/api/chat`.
//!
//! Ollama's chat endpoint is stateless, so the conversation lives here: each
//! send carries the full history, and the exchange is appended to it once the
//! reply stream has been read to the end.

use async_stream::stream;
use ragloop_core::{ChatError, ChatHandle, FragmentStream, Role};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::OllamaClient;
use crate::wire::{ChatChunk, ChatMessage, ChatRequest};

/// A conversation with one model on an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaChat {
    client: OllamaClient,
    model: String,
    history: Vec<ChatMessage>,
}

impl OllamaChat {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            history: Vec::new(),
        }
    }

    /// Messages exchanged so far, in order.
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }
}

impl ChatHandle for OllamaChat {
    fn model(&self) -> &str {
        &self.model
    }

    fn select_model(&mut self, model: &str) {
        self.model = model.to_string();
    }

    fn send_as<'a>(
        &'a mut self,
        role: Role,
        content: &'a str,
        cancel: &'a CancellationToken,
    ) -> FragmentStream<'a> {
        Box::pin(stream! {
            let mut messages = self.history.clone();
            messages.push(ChatMessage::new(role, content));

            let request = ChatRequest {
                model: &self.model,
                messages: &messages,
                stream: true,
            };
            let mut chunks = match self.client.post_ndjson("/api/chat", &request, cancel).await {
                Ok(chunks) => chunks,
                Err(err) => {
                    yield Err(ChatError::from(err));
                    return;
                }
            };

            let mut reply = String::new();
            while let Some(chunk) = chunks.next::<ChatChunk>(cancel).await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(ChatError::from(err));
                        return;
                    }
                };
                if let Some(error) = chunk.error {
                    yield Err(ChatError::Rejected(error));
                    return;
                }
                if let Some(message) = chunk.message {
                    if !message.content.is_empty() {
                        reply.push_str(&message.content);
                        yield Ok(message.content);
                    }
                }
                if chunk.done {
                    break;
                }
            }

            debug!("{} replied to {} message with {} chars", self.model, role, reply.len());
            messages.push(ChatMessage::new(Role::Assistant, reply));
            self.history = messages;
        })
    }
}
