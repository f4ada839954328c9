use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::info;

use super::{RawRow, Result, RowPayload, RowSink, SourceEnrichment};

/// Writes one JSON object per row to stdout or a file
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

#[derive(Serialize)]
struct Line<'a> {
    #[serde(flatten)]
    enrichment: &'a SourceEnrichment,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    insert_id: Option<&'a str>,
    payload_kind: &'static str,
    payload: serde_json::Value,
}

impl JsonLinesSink {
    pub fn stdout() -> Self {
        Self::from_writer(tokio::io::stdout())
    }

    /// Append to `path`, creating it and its parent directory when missing
    pub async fn file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        info!(path = %path.display(), "Writing rows to file");
        Ok(Self::from_writer(file))
    }

    pub fn from_writer<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

fn payload_value(payload: &RowPayload) -> serde_json::Value {
    match payload {
        RowPayload::Structured(value) => value.clone(),
        RowPayload::FileText(text) => serde_json::from_str(text)
            .unwrap_or_else(|_| serde_json::Value::String(text.clone())),
        RowPayload::RawBytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => serde_json::Value::String(text.to_string()),
            Err(_) => serde_json::Value::from(bytes.to_vec()),
        },
    }
}

#[async_trait]
impl RowSink for JsonLinesSink {
    async fn emit(&self, row: RawRow, enrichment: &SourceEnrichment) -> Result<()> {
        let line = Line {
            enrichment,
            timestamp: row.timestamp,
            insert_id: row.insert_id.as_deref(),
            payload_kind: row.payload.kind(),
            payload: payload_value(&row.payload),
        };
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_sink_writes_one_line_per_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out/rows.jsonl");
        let sink = JsonLinesSink::file(&path).await.unwrap();

        let enrichment = SourceEnrichment::new("audit", "gcp_audit_log", "my-project");
        let ts = Utc.with_ymd_and_hms(2025, 6, 6, 0, 0, 0).unwrap();
        sink.emit(
            RawRow::structured(serde_json::json!({"insertId": "a"}), ts, "a"),
            &enrichment,
        )
        .await
        .unwrap();
        sink.emit(RawRow::file_text("plain text"), &enrichment)
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["source"], "audit");
        assert_eq!(lines[0]["scope"], "my-project");
        assert_eq!(lines[0]["insert_id"], "a");
        assert_eq!(lines[0]["payload_kind"], "structured");
        assert_eq!(lines[1]["payload"], "plain text");
        assert!(lines[1].get("timestamp").is_none());
    }

    #[test]
    fn test_payload_values() {
        assert_eq!(
            payload_value(&RowPayload::FileText("{\"a\":1}".to_string())),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            payload_value(&RowPayload::RawBytes(Bytes::from_static(&[0xff, 0x00]))),
            serde_json::json!([255, 0])
        );
    }
}
