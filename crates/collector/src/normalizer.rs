//! Normalization of raw API payloads into [`NormalizedRecord`]s

use chrono::{SecondsFormat, Utc};
use collector_common::types::{
    NormalizedRecord, METADATA_SOURCE, METADATA_TIMESTAMP, METADATA_VERSION, RECORD_SOURCE,
    RECORD_VERSION,
};
use serde_json::{Map, Value};

/// Wraps upstream items with collection metadata
#[derive(Debug, Clone)]
pub struct Normalizer {
    source: String,
    version: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            source: RECORD_SOURCE.to_string(),
            version: RECORD_VERSION.to_string(),
        }
    }
}

impl Normalizer {
    pub fn new(source: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            version: version.into(),
        }
    }

    /// Turn a raw payload into records
    ///
    /// An array yields one record per element, in order; any other value
    /// (object, scalar, null) yields exactly one record. `extra` is merged
    /// into each record's metadata after the standard fields and wins on
    /// key collision.
    pub fn normalize(
        &self,
        raw: Value,
        extra: Option<&Map<String, Value>>,
    ) -> Vec<NormalizedRecord> {
        match raw {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.wrap(item, extra))
                .collect(),
            other => vec![self.wrap(other, extra)],
        }
    }

    fn wrap(&self, data: Value, extra: Option<&Map<String, Value>>) -> NormalizedRecord {
        let mut metadata = Map::new();
        metadata.insert(
            METADATA_TIMESTAMP.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        metadata.insert(METADATA_SOURCE.to_string(), Value::String(self.source.clone()));
        metadata.insert(METADATA_VERSION.to_string(), Value::String(self.version.clone()));
        if let Some(extra) = extra {
            metadata.extend(extra.clone());
        }

        NormalizedRecord { data, metadata }
    }
}

/// Number of items a raw payload will expand to
pub fn item_count(raw: &Value) -> usize {
    match raw {
        Value::Array(items) => items.len(),
        _ => 1,
    }
}
