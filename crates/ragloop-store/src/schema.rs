//! Mapping between [`MemoryRecord`]s and backend metadata.
//!
//! Stored metadata keys: `id`, `text`, `description`, `timestamp` (RFC 3339).

use chrono::{DateTime, Utc};
use ragloop_core::{Embedding, MemoryRecord};
use serde_json::Value;
use tracing::debug;

use crate::backend::{Metadata, QueryHit};

pub const ID_KEY: &str = "id";
pub const TEXT_KEY: &str = "text";
pub const DESCRIPTION_KEY: &str = "description";
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Metadata persisted alongside a record's vector.
#[must_use]
pub fn record_metadata(record: &MemoryRecord) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(ID_KEY.to_string(), Value::String(record.id.clone()));
    metadata.insert(TEXT_KEY.to_string(), Value::String(record.text.clone()));
    metadata.insert(
        DESCRIPTION_KEY.to_string(),
        Value::String(record.description.clone()),
    );
    metadata.insert(
        TIMESTAMP_KEY.to_string(),
        Value::String(record.timestamp.to_rfc3339()),
    );
    metadata
}

/// Rebuild a record from a query hit.
///
/// Text falls back to the stored document when metadata lacks it; a missing
/// or unparseable timestamp becomes the Unix epoch.
#[must_use]
pub fn record_from_hit(hit: QueryHit, embedding: Option<Embedding>) -> MemoryRecord {
    let metadata = hit.metadata.unwrap_or_default();
    let text = string_field(&metadata, TEXT_KEY)
        .or(hit.document)
        .unwrap_or_default();
    let description = string_field(&metadata, DESCRIPTION_KEY).unwrap_or_default();
    let timestamp = string_field(&metadata, TIMESTAMP_KEY)
        .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
            Err(err) => {
                debug!("Ignoring timestamp {:?} on record {}: {}", raw, hit.id, err);
                None
            }
        })
        .unwrap_or_default();

    MemoryRecord {
        id: hit.id,
        text,
        description,
        embedding,
        timestamp,
    }
}

fn string_field(metadata: &Metadata, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(value) => Some(value.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
