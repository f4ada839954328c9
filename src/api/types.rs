use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::FetchError;

pub const ORDER_TIMESTAMP_ASC: &str = "timestamp asc";
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Body of an `entries:list` call
#[derive(Debug, Clone, PartialEq, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesRequest {
    pub resource_names: Vec<String>,
    #[builder(into)]
    pub filter: String,
    #[builder(into, default = ORDER_TIMESTAMP_ASC.to_string())]
    pub order_by: String,
    #[builder(default = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListEntriesResponse {
    #[serde(default)]
    pub entries: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One record as returned by the backend, with its cursor key extracted
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub insert_id: String,
    pub raw: serde_json::Value,
}

impl LogEntry {
    /// Extract the cursor key. `receiveTimestamp` stands in when `timestamp`
    /// is absent; a missing `insertId` becomes empty.
    pub fn from_value(raw: serde_json::Value) -> Result<Self, FetchError> {
        let timestamp = ["timestamp", "receiveTimestamp"]
            .iter()
            .find_map(|field| raw.get(*field).and_then(|value| value.as_str()))
            .ok_or_else(|| FetchError::Decode("entry has no timestamp".to_string()))?;
        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| FetchError::Decode(format!("bad timestamp '{timestamp}': {e}")))?
            .with_timezone(&Utc);

        let insert_id = raw
            .get("insertId")
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            timestamp,
            insert_id,
            raw,
        })
    }
}

/// One page of results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntriesPage {
    pub entries: Vec<LogEntry>,
    /// `None` (or empty) when the backend has no more pages
    pub next_page_token: Option<String>,
    /// Entries dropped because no cursor key could be extracted
    pub malformed: u64,
}

impl EntriesPage {
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

impl From<ListEntriesResponse> for EntriesPage {
    /// Entries without a usable timestamp cannot be ordered and are dropped
    fn from(response: ListEntriesResponse) -> Self {
        let mut entries = Vec::with_capacity(response.entries.len());
        let mut malformed = 0;
        for raw in response.entries {
            match LogEntry::from_value(raw) {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    warn!(error = %error, "Skipping malformed entry");
                    malformed += 1;
                }
            }
        }
        Self {
            entries,
            next_page_token: response.next_page_token,
            malformed,
        }
    }
}
