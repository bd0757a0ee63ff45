//! Newline-delimited JSON response streams.

use std::collections::VecDeque;

use ragloop_core::{BackendError, CallError};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::client::transport_error;

/// Splits a byte stream into complete, non-blank lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    /// Feed bytes, returning every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            push_line(&mut lines, &line);
        }
        lines
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        let rest = std::mem::take(&mut self.partial);
        push_line(&mut lines, &rest);
        lines.pop()
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
}

/// Decodes one JSON value per line from a streaming response.
pub(crate) struct NdjsonStream {
    endpoint: String,
    response: reqwest::Response,
    lines: LineBuffer,
    pending: VecDeque<String>,
    finished: bool,
}

impl NdjsonStream {
    pub fn new(endpoint: String, response: reqwest::Response) -> Self {
        Self {
            endpoint,
            response,
            lines: LineBuffer::default(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next decoded line, `None` once the body is exhausted.
    pub async fn next<T: DeserializeOwned>(
        &mut self,
        cancel: &CancellationToken,
    ) -> Option<Result<T, CallError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(serde_json::from_str(&line).map_err(|err| {
                    CallError::Backend(BackendError::Decode {
                        endpoint: self.endpoint.clone(),
                        reason: err.to_string(),
                    })
                }));
            }
            if self.finished {
                return None;
            }

            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Some(Err(CallError::Cancelled)),
                chunk = self.response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => self.pending.extend(self.lines.push(&bytes)),
                Ok(None) => {
                    self.finished = true;
                    self.pending.extend(self.lines.finish());
                }
                Err(err) => {
                    self.finished = true;
                    return Some(Err(transport_error(&self.endpoint, &err).into()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"status\":\"pull").is_empty());
        assert_eq!(
            buffer.push(b"ing\"}\n{\"status\":\"success\"}\n{\"a\""),
            vec![
                r#"{"status":"pulling"}"#.to_string(),
                r#"{"status":"success"}"#.to_string()
            ]
        );
        assert_eq!(buffer.finish().as_deref(), Some(r#"{"a""#));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_blank_and_crlf_lines() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.push(b"\n\r\n{}\r\n\n"), vec!["{}".to_string()]);
    }
}
