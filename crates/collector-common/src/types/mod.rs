//! Common types used across the collector

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Envelope Constants
// ============================================================================

/// Source tag stamped on every normalized record.
pub const RECORD_SOURCE: &str = "api_collector";

/// Envelope version stamped on every normalized record.
pub const RECORD_VERSION: &str = "1.0";

/// Metadata key holding the normalization timestamp.
pub const METADATA_TIMESTAMP: &str = "timestamp";

/// Metadata key holding the source tag.
pub const METADATA_SOURCE: &str = "source";

/// Metadata key holding the envelope version.
pub const METADATA_VERSION: &str = "version";

// ============================================================================
// Envelope Types
// ============================================================================

/// One item fetched from the upstream API, wrapped with collection metadata.
///
/// The `data` field carries the upstream item unmodified. The `metadata`
/// object always contains `timestamp`, `source` and `version`, plus any extra
/// fields supplied by the caller at normalization time. Keys are kept in a
/// sorted map so the serialized form is canonical.
///
/// # Examples
///
/// ```rust,ignore
/// use collector_common::types::NormalizedRecord;
///
/// let record: NormalizedRecord = serde_json::from_slice(&delivery.data)?;
/// assert_eq!(record.source(), Some("api_collector"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedRecord {
    /// The upstream item, untouched
    pub data: Value,

    /// Collection metadata
    pub metadata: Map<String, Value>,
}

impl NormalizedRecord {
    /// Timestamp assigned at normalization time (RFC 3339, UTC)
    pub fn timestamp(&self) -> Option<&str> {
        self.metadata.get(METADATA_TIMESTAMP).and_then(Value::as_str)
    }

    /// Parsed normalization timestamp, if present and well formed
    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Source tag of the record
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(METADATA_SOURCE).and_then(Value::as_str)
    }

    /// Envelope version of the record
    pub fn version(&self) -> Option<&str> {
        self.metadata.get(METADATA_VERSION).and_then(Value::as_str)
    }

    /// Canonical JSON encoding used on the wire
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
