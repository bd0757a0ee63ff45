//! Chat sessions for ragloop.
//!
//! A [`ChatSession`] owns one stateful backend conversation and the model
//! provisioning that has to happen before its first turn.

pub mod session;

pub use session::{ChatSession, SessionState};
