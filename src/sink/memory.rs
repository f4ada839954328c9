use std::sync::Mutex;

use async_trait::async_trait;

use super::{RawRow, Result, RowSink, SinkError, SourceEnrichment};

type Stored = Vec<(RawRow, SourceEnrichment)>;

/// In-memory sink for dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Stored>,
    pending: Mutex<Stored>,
    reject_after: Option<usize>,
    buffered: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `limit` rows, then reject every further one
    pub fn rejecting_after(limit: usize) -> Self {
        Self {
            reject_after: Some(limit),
            ..Self::default()
        }
    }

    /// Hold emitted rows until `flush`, like a buffered writer
    pub fn buffered() -> Self {
        Self {
            buffered: true,
            ..Self::default()
        }
    }

    /// Rows that reached the sink's output
    pub fn rows(&self) -> Vec<(RawRow, SourceEnrichment)> {
        self.rows
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Rows emitted but not yet flushed
    pub fn pending(&self) -> Vec<(RawRow, SourceEnrichment)> {
        self.pending
            .lock()
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> SinkError {
    SinkError::Rejected("sink poisoned".to_string())
}

#[async_trait]
impl RowSink for MemorySink {
    async fn emit(&self, row: RawRow, enrichment: &SourceEnrichment) -> Result<()> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let mut pending = self.pending.lock().map_err(poisoned)?;
        let held = rows.len() + pending.len();

        if self.reject_after.is_some_and(|limit| held >= limit) {
            return Err(SinkError::Rejected(format!(
                "memory sink full after {held} rows"
            )));
        }

        if self.buffered {
            pending.push((row, enrichment.clone()));
        } else {
            rows.push((row, enrichment.clone()));
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let mut pending = self.pending.lock().map_err(poisoned)?;
        rows.append(&mut pending);
        Ok(())
    }
}
