//! Retrieval and the end-to-end pipeline for ragloop.
//!
//! [`Retriever`] embeds a question and fetches its nearest chunks.
//! [`RagPipeline`] is the surface a driver talks to: ingest a document once,
//! then ask grounded questions through a chat session.

pub mod pipeline;
pub mod retriever;

pub use pipeline::{Answer, DEFAULT_GROUNDING_PREFIX, IngestReport, RagPipeline};
pub use retriever::{Retriever, grounding_texts};
