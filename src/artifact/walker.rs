//! Recursive, best-effort discovery of artifacts in a bucket

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::layout::{DirMatch, LayoutPattern};
use super::storage::{Listing, ObjectLister, StorageError};
use crate::observability::Metrics;
use crate::retry::{RetryError, RetryPolicy};

const CHANNEL_CAPACITY: usize = 64;

/// An object (or, on request, a directory) whose path matched the layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub path: String,
    pub matched_fields: BTreeMap<String, String>,
    pub is_directory: bool,
    pub size: u64,
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A subtree that could not be listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingFailure {
    pub dir: String,
    pub error: String,
}

impl fmt::Display for ListingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.dir.is_empty() { "<root>" } else { &self.dir };
        write!(f, "{}: {}", dir, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories_listed: u64,
    pub directories_pruned: u64,
    pub objects_seen: u64,
    pub artifacts: u64,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{} listing(s) failed: {}", .failures.len(), join_failures(.failures))]
    Partial {
        failures: Vec<ListingFailure>,
        stats: WalkStats,
    },

    #[error("discovery cancelled")]
    Cancelled,

    #[error("discovery task failed: {0}")]
    Task(String),
}

fn join_failures(failures: &[ListingFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What to walk and how
#[derive(Clone)]
pub struct WalkOptions {
    /// Start of every path considered; need not end on a `/`
    pub prefix: String,
    pub layout: Arc<LayoutPattern>,
    /// Prune date-named directories and files older than this day
    pub since: Option<NaiveDate>,
    /// Also yield directories that were descended into
    pub include_directories: bool,
    pub policy: RetryPolicy,
}

/// Lazily produced artifacts of one walk
///
/// Dropping the handle stops the walk.
pub struct Discovery {
    rx: mpsc::Receiver<ArtifactInfo>,
    handle: JoinHandle<Result<WalkStats, DiscoveryError>>,
    _guard: DropGuard,
}

impl Discovery {
    pub async fn next(&mut self) -> Option<ArtifactInfo> {
        self.rx.recv().await
    }

    /// Wait for the walk to end and collect its outcome.
    ///
    /// Artifacts still buffered are discarded.
    pub async fn finish(self) -> Result<WalkStats, DiscoveryError> {
        let Discovery { rx, handle, _guard } = self;
        drop(rx);
        let outcome = handle
            .await
            .map_err(|e| DiscoveryError::Task(e.to_string()))?;
        drop(_guard);
        outcome
    }
}

/// Start walking `lister` in the background
pub fn discover(
    lister: Arc<dyn ObjectLister>,
    options: WalkOptions,
    metrics: Arc<Metrics>,
    cancel: &CancellationToken,
) -> Discovery {
    let walk_cancel = cancel.child_token();
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    let walker = Walker {
        lister,
        options,
        metrics,
        cancel: walk_cancel.clone(),
        tx,
        stats: WalkStats::default(),
        failures: Vec::new(),
    };
    let handle = tokio::spawn(walker.run());

    Discovery {
        rx,
        handle,
        _guard: walk_cancel.drop_guard(),
    }
}

struct Walker {
    lister: Arc<dyn ObjectLister>,
    options: WalkOptions,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    tx: mpsc::Sender<ArtifactInfo>,
    stats: WalkStats,
    failures: Vec<ListingFailure>,
}

/// The consumer went away or the walk was cancelled
struct Stop;

impl Walker {
    async fn run(mut self) -> Result<WalkStats, DiscoveryError> {
        let prefix = self.options.prefix.clone();
        let (start, name_filter) = match prefix.rsplit_once('/') {
            _ if prefix.is_empty() => (String::new(), None),
            Some((parent, "")) => (parent.to_string(), None),
            Some((parent, _)) => (parent.to_string(), Some(prefix.clone())),
            None => (String::new(), Some(prefix.clone())),
        };
        info!(prefix = %prefix, start = %start, layout = self.options.layout.template(), "Starting discovery");

        // Depth-first; children pushed in reverse keep lexical order
        let mut stack = vec![start];
        let mut first = true;

        while let Some(dir) = stack.pop() {
            if self.cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }

            let listing = match self.list(&dir).await {
                Ok(listing) => listing,
                Err(None) => return Err(DiscoveryError::Cancelled),
                Err(Some(error)) => {
                    warn!(dir = %dir, error = %error, "Listing failed, continuing with siblings");
                    self.metrics.listing_failed();
                    self.failures.push(ListingFailure {
                        dir: dir.clone(),
                        error: error.to_string(),
                    });
                    first = false;
                    continue;
                }
            };
            self.stats.directories_listed += 1;

            let filter = if first { name_filter.as_deref() } else { None };
            first = false;
            let keep = |path: &str| filter.is_none_or(|prefix| path.starts_with(prefix));

            let mut children = Vec::new();
            for child in listing.directories.into_iter().filter(|d| keep(d.as_str())) {
                match self.visit_dir(&child) {
                    Some(fields) => {
                        if self.options.include_directories {
                            let info = ArtifactInfo {
                                path: child.clone(),
                                matched_fields: fields,
                                is_directory: true,
                                size: 0,
                                e_tag: None,
                                last_modified: None,
                            };
                            if self.send(info).await.is_err() {
                                return self.stopped();
                            }
                        }
                        children.push(child);
                    }
                    None => self.stats.directories_pruned += 1,
                }
            }
            stack.extend(children.into_iter().rev());

            for object in listing.objects.into_iter().filter(|o| keep(o.path.as_str())) {
                self.stats.objects_seen += 1;
                let Some(fields) = self.options.layout.match_path(&object.path) else {
                    continue;
                };
                if self.older_than_since(&fields) {
                    debug!(path = %object.path, "Artifact before since date, skipping");
                    continue;
                }

                let info = ArtifactInfo {
                    path: object.path,
                    matched_fields: fields,
                    is_directory: false,
                    size: object.size,
                    e_tag: object.e_tag,
                    last_modified: object.last_modified,
                };
                self.metrics.artifact_discovered();
                self.stats.artifacts += 1;
                if self.send(info).await.is_err() {
                    return self.stopped();
                }
            }
        }

        info!(
            listed = self.stats.directories_listed,
            pruned = self.stats.directories_pruned,
            artifacts = self.stats.artifacts,
            failures = self.failures.len(),
            "Discovery finished"
        );

        if self.failures.is_empty() {
            Ok(self.stats)
        } else {
            Err(DiscoveryError::Partial {
                failures: self.failures,
                stats: self.stats,
            })
        }
    }

    /// `Err(None)` means cancelled
    async fn list(&self, dir: &str) -> Result<Listing, Option<StorageError>> {
        let lister = self.lister.clone();
        let result = self
            .options
            .policy
            .run(&self.cancel, || StorageError::Timeout, || {
                let lister = lister.clone();
                let dir = dir.to_string();
                async move { lister.list_dir(&dir).await }
            })
            .await;

        match result {
            Ok(listing) => Ok(listing),
            Err(RetryError::Cancelled) => Err(None),
            Err(RetryError::Fatal(error)) | Err(RetryError::Exhausted { last: error, .. }) => {
                Err(Some(error))
            }
        }
    }

    /// Fields of a directory worth descending into, `None` for SkipDir
    fn visit_dir(&self, dir: &str) -> Option<BTreeMap<String, String>> {
        match self.options.layout.match_dir(dir) {
            DirMatch::SkipDir => {
                debug!(dir, "No layout alternative can match, skipping directory");
                None
            }
            DirMatch::Descend(fields) if self.older_than_since(&fields) => {
                debug!(dir, "Directory before since date, skipping");
                None
            }
            DirMatch::Descend(fields) => Some(fields),
        }
    }

    fn older_than_since(&self, fields: &BTreeMap<String, String>) -> bool {
        self.options
            .since
            .is_some_and(|since| date_before(fields, since))
    }

    async fn send(&self, info: ArtifactInfo) -> Result<(), Stop> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Stop),
            sent = self.tx.send(info) => sent.map_err(|_| Stop),
        }
    }

    fn stopped(&self) -> Result<WalkStats, DiscoveryError> {
        debug!("Discovery stopped early");
        Err(DiscoveryError::Cancelled)
    }
}

fn field_value(fields: &BTreeMap<String, String>, names: &[&str]) -> Option<u32> {
    fields
        .iter()
        .find(|(name, _)| names.iter().any(|wanted| name.eq_ignore_ascii_case(wanted)))
        .and_then(|(_, value)| value.parse().ok())
}

/// True when the date parts present in `fields` lie wholly before `since`
pub fn date_before(fields: &BTreeMap<String, String>, since: NaiveDate) -> bool {
    let Some(year) = field_value(fields, &["year"]) else {
        return false;
    };
    let month = field_value(fields, &["month", "monthnum"]);
    let day = field_value(fields, &["day", "monthday"]);

    let since_year = since.year() as u32;
    match (month, day) {
        (Some(month), Some(day)) => (year, month, day) < (since_year, since.month(), since.day()),
        (Some(month), None) => (year, month) < (since_year, since.month()),
        _ => year < since_year,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_date_before_uses_available_parts() {
        let since = NaiveDate::from_ymd_opt(2025, 6, 6).unwrap();

        assert!(date_before(&fields(&[("year", "2024")]), since));
        assert!(!date_before(&fields(&[("year", "2025")]), since));
        assert!(date_before(&fields(&[("year", "2025"), ("month", "05")]), since));
        assert!(!date_before(&fields(&[("YEAR", "2025"), ("MONTHNUM", "06")]), since));
        assert!(date_before(
            &fields(&[("year", "2025"), ("month", "06"), ("day", "05")]),
            since
        ));
        assert!(!date_before(
            &fields(&[("year", "2025"), ("month", "06"), ("day", "06")]),
            since
        ));
        assert!(!date_before(&fields(&[("type", "activity")]), since));
    }

    #[test]
    fn test_failure_display() {
        let error = DiscoveryError::Partial {
            failures: vec![
                ListingFailure {
                    dir: String::new(),
                    error: "boom".to_string(),
                },
                ListingFailure {
                    dir: "a/b".to_string(),
                    error: "denied".to_string(),
                },
            ],
            stats: WalkStats::default(),
        };
        assert_eq!(error.to_string(), "2 listing(s) failed: <root>: boom; a/b: denied");
    }
}
