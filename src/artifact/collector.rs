//! Bucket collector: discovered artifacts downloaded and emitted line by line

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::layout::LayoutPattern;
use super::storage::{ObjectLister, StorageError};
use super::walker::{ArtifactInfo, DiscoveryError, WalkOptions, discover};
use crate::collector::{CollectReport, Collector};
use crate::error::{CollectError, Result};
use crate::observability::Metrics;
use crate::retry::{RetryError, RetryPolicy};
use crate::sink::{RawRow, RowPayload, RowSink, SourceEnrichment};
use crate::state::keys::last_run_meta;
use crate::state::{ArtifactRecord, StateStore};

/// Per-source settings for a bucket collector
#[derive(Debug, Clone)]
pub struct BucketSourceSettings {
    pub name: String,
    pub bucket: String,
    pub table: String,
    pub prefix: String,
    /// Accepted file extensions, each starting with `.`; empty accepts all
    pub extensions: Vec<String>,
    pub since: Option<NaiveDate>,
}

pub struct BucketCollector {
    settings: BucketSourceSettings,
    layout: Arc<LayoutPattern>,
    lister: Arc<dyn ObjectLister>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl BucketCollector {
    pub fn new(
        settings: BucketSourceSettings,
        layout: Arc<LayoutPattern>,
        lister: Arc<dyn ObjectLister>,
        policy: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            settings,
            layout,
            lister,
            policy,
            metrics,
        }
    }

    pub fn settings(&self) -> &BucketSourceSettings {
        &self.settings
    }

    pub fn walk_options(&self, include_directories: bool) -> WalkOptions {
        WalkOptions {
            prefix: self.settings.prefix.clone(),
            layout: self.layout.clone(),
            since: self.settings.since,
            include_directories,
            policy: self.policy,
        }
    }

    /// Walk the bucket without downloading anything
    pub fn discover(&self, cancel: &CancellationToken, include_directories: bool) -> super::Discovery {
        discover(
            self.lister.clone(),
            self.walk_options(include_directories),
            self.metrics.clone(),
            cancel,
        )
    }

    fn wanted_extension(&self, path: &str) -> bool {
        self.settings.extensions.is_empty()
            || self
                .settings
                .extensions
                .iter()
                .any(|extension| path.ends_with(extension.as_str()))
    }

    async fn download(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes> {
        let lister = self.lister.clone();
        let result = self
            .policy
            .run(cancel, || StorageError::Timeout, || {
                let lister = lister.clone();
                let path = path.to_string();
                async move { lister.fetch(&path).await }
            })
            .await;

        match result {
            Ok(bytes) => Ok(bytes),
            Err(RetryError::Cancelled) => Err(CollectError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => Err(CollectError::exhausted(attempts, last)),
            Err(RetryError::Fatal(error)) => Err(CollectError::fatal(error)),
        }
    }

    /// Emit one row per non-empty line; non-UTF-8 objects become one raw row
    async fn emit_artifact(
        &self,
        artifact: &ArtifactInfo,
        contents: Bytes,
        sink: &dyn RowSink,
        enrichment: &SourceEnrichment,
    ) -> Result<u64> {
        let enrichment = enrichment.with_fields(artifact.matched_fields.clone());

        let text = match std::str::from_utf8(&contents) {
            Ok(text) => text,
            Err(_) => {
                let row = RawRow {
                    payload: RowPayload::RawBytes(contents.clone()),
                    timestamp: None,
                    insert_id: None,
                };
                sink.emit(row, &enrichment).await?;
                return Ok(1);
            }
        };

        let mut rows = 0;
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            sink.emit(RawRow::file_text(line), &enrichment).await?;
            rows += 1;
        }
        Ok(rows)
    }
}

/// Same object as recorded; versions are compared only when both sides know them
fn unchanged(previous: &ArtifactRecord, artifact: &ArtifactInfo) -> bool {
    fn same<T: PartialEq>(recorded: &Option<T>, listed: &Option<T>) -> bool {
        match (recorded, listed) {
            (Some(recorded), Some(listed)) => recorded == listed,
            _ => true,
        }
    }

    previous.size == artifact.size
        && same(&previous.e_tag, &artifact.e_tag)
        && same(&previous.last_modified, &artifact.last_modified)
}

#[async_trait]
impl Collector for BucketCollector {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn kind(&self) -> &'static str {
        "storage_bucket"
    }

    async fn collect(
        &self,
        cancel: &CancellationToken,
        sink: &dyn RowSink,
        store: &StateStore,
    ) -> Result<CollectReport> {
        let name = self.settings.name.as_str();
        let enrichment = SourceEnrichment::new(name, &self.settings.table, &self.settings.bucket);
        let mut report = CollectReport {
            source: name.to_string(),
            ..CollectReport::default()
        };

        info!(source = name, bucket = %self.settings.bucket, prefix = %self.settings.prefix, "Starting bucket collection");
        let mut discovery = self.discover(cancel, false);

        while let Some(artifact) = discovery.next().await {
            if !self.wanted_extension(&artifact.path) {
                self.metrics.artifact_skipped();
                continue;
            }
            if let Some(previous) = store.artifact(name, &artifact.path)? {
                if unchanged(&previous, &artifact) {
                    debug!(source = name, path = %artifact.path, "Artifact already collected");
                    self.metrics.artifact_skipped();
                    continue;
                }
                info!(source = name, path = %artifact.path, "Artifact changed since last run, collecting again");
            }

            let contents = self.download(&artifact.path, cancel).await?;
            let rows = self
                .emit_artifact(&artifact, contents, sink, &enrichment)
                .await?;

            sink.flush().await?;
            store.record_artifact(
                name,
                &ArtifactRecord {
                    path: artifact.path.clone(),
                    size: artifact.size,
                    e_tag: artifact.e_tag.clone(),
                    last_modified: artifact.last_modified,
                    rows,
                    collected_at: Utc::now(),
                },
            )?;
            self.metrics.rows_emitted(rows);
            report.rows_emitted += rows;
            report.artifacts += 1;
        }

        sink.flush().await?;

        match discovery.finish().await {
            Ok(_) => {}
            Err(DiscoveryError::Cancelled) => return Err(CollectError::Cancelled),
            Err(error) => {
                warn!(source = name, error = %error, artifacts = report.artifacts, "Discovery incomplete");
                return Err(error.into());
            }
        }

        store.set_meta(&last_run_meta(name), &Utc::now().to_rfc3339())?;
        info!(source = name, artifacts = report.artifacts, rows = report.rows_emitted, "Bucket collection complete");
        Ok(report)
    }
}
