//! Row sinks: where accepted records go
//!
//! Both collection paths end here. The API path emits structured entries, the
//! bucket path emits one text row per line of a downloaded object. Payload
//! shape is decided once when the row is built, never per field downstream.

mod jsonl;
mod memory;

pub use jsonl::JsonLinesSink;
pub use memory::MemorySink;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Row rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, SinkError>;

/// Raw record payload, tagged by how it was delivered
#[derive(Debug, Clone, PartialEq)]
pub enum RowPayload {
    /// Entry decoded by the API client
    Structured(serde_json::Value),
    /// One line of a downloaded artifact
    FileText(String),
    RawBytes(Bytes),
}

impl RowPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RowPayload::Structured(_) => "structured",
            RowPayload::FileText(_) => "file_text",
            RowPayload::RawBytes(_) => "raw_bytes",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub payload: RowPayload,
    pub timestamp: Option<DateTime<Utc>>,
    pub insert_id: Option<String>,
}

impl RawRow {
    pub fn structured(value: serde_json::Value, timestamp: DateTime<Utc>, insert_id: &str) -> Self {
        Self {
            payload: RowPayload::Structured(value),
            timestamp: Some(timestamp),
            insert_id: Some(insert_id.to_string()),
        }
    }

    pub fn file_text(line: impl Into<String>) -> Self {
        Self {
            payload: RowPayload::FileText(line.into()),
            timestamp: None,
            insert_id: None,
        }
    }
}

/// Identity attached to every row so the mapping layer can pick its decoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEnrichment {
    pub source: String,
    pub table: String,
    pub scope: String,
    /// Fields recovered from an artifact path; empty for API rows
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl SourceEnrichment {
    pub fn new(source: impl Into<String>, table: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            table: table.into(),
            scope: scope.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_fields(&self, fields: BTreeMap<String, String>) -> Self {
        Self {
            fields,
            ..self.clone()
        }
    }
}

/// Destination for accepted rows; shared by concurrently running sources
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Deliver one row. Any error aborts the calling run.
    async fn emit(&self, row: RawRow, enrichment: &SourceEnrichment) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
