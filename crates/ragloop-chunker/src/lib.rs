//! Document chunking for ragloop.
//!
//! Documents are split on line boundaries; lines are packed into a chunk
//! until the next one would push it past the unit limit.

pub mod lines;

pub use lines::{LineChunker, LineChunks, TokenEstimate};
