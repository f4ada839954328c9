use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::cursor::CollectionSnapshot;
use super::error::{Result, StateError};
use super::keys::{
    decode_state_key, encode_artifact_key, encode_artifact_prefix, encode_meta_key,
    encode_state_key,
};

/// An object whose rows were all emitted by an earlier run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    pub rows: u64,
    pub collected_at: DateTime<Utc>,
}

/// Fjall-backed persistent storage for cursors, collected artifacts, and metadata
#[derive(Clone)]
pub struct StateStore {
    keyspace: Keyspace,
    cursors: PartitionHandle,
    artifacts: PartitionHandle,
    metadata: PartitionHandle,
}

impl StateStore {
    /// Open or create a state store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening state store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let cursors = keyspace.open_partition("cursors", PartitionCreateOptions::default())?;
        let artifacts = keyspace.open_partition("artifacts", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            cursors,
            artifacts,
            metadata,
        })
    }

    /// Load the cursor of a source; `None` means first run
    pub fn load(&self, source: &str) -> Result<Option<CollectionSnapshot>> {
        match self.cursors.get(encode_state_key(source))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Store a cursor snapshot and flush it to disk
    pub fn save(&self, source: &str, snapshot: &CollectionSnapshot) -> Result<()> {
        let value = serde_json::to_vec(snapshot)?;
        self.cursors.insert(encode_state_key(source), value)?;
        self.persist()?;
        debug!(
            source,
            window_start = %snapshot.window_start,
            window_end = %snapshot.window_end,
            "Saved cursor"
        );
        Ok(())
    }

    /// All stored cursors, ordered by source name
    pub fn list(&self) -> Result<Vec<(String, CollectionSnapshot)>> {
        let mut cursors = Vec::new();
        for item in self.cursors.iter() {
            let (key, value) = item?;
            let source = decode_state_key(&key)
                .ok_or_else(|| StateError::InvalidKey(String::from_utf8_lossy(&key).into_owned()))?;
            cursors.push((source, serde_json::from_slice(&value)?));
        }
        Ok(cursors)
    }

    /// Forget everything collected for a source. Returns whether a cursor existed.
    pub fn reset(&self, source: &str) -> Result<bool> {
        let key = encode_state_key(source);
        let existed = self.cursors.contains_key(&key)?;
        self.cursors.remove(key)?;

        let mut artifact_keys = Vec::new();
        for item in self.artifacts.prefix(encode_artifact_prefix(source)) {
            let (key, _) = item?;
            artifact_keys.push(key);
        }
        for key in &artifact_keys {
            self.artifacts.remove(key.to_vec())?;
        }

        self.metadata
            .remove(encode_meta_key(&super::keys::last_run_meta(source)))?;
        self.persist()?;

        info!(source, artifacts = artifact_keys.len(), "Reset collection state");
        Ok(existed)
    }

    pub fn artifact(&self, source: &str, path: &str) -> Result<Option<ArtifactRecord>> {
        match self.artifacts.get(encode_artifact_key(source, path))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn record_artifact(&self, source: &str, record: &ArtifactRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        self.artifacts
            .insert(encode_artifact_key(source, &record.path), value)?;
        self.persist()?;
        debug!(source, path = %record.path, rows = record.rows, "Recorded artifact");
        Ok(())
    }

    pub fn artifact_count(&self, source: &str) -> Result<usize> {
        let mut count = 0;
        for item in self.artifacts.prefix(encode_artifact_prefix(source)) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.metadata.insert(encode_meta_key(key), value.as_bytes())?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .metadata
            .get(encode_meta_key(key))?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }
}
