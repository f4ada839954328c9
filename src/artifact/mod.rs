//! Artifact path: logs delivered as files in object storage
//!
//! The walker lists the bucket one directory level at a time, prunes
//! subtrees the layout can no longer match, and yields every object whose
//! path matches. Listing failures are collected rather than fatal, so a walk
//! reports both what it found and what it could not see.

mod collector;
mod layout;
mod storage;
mod walker;

pub use collector::{BucketCollector, BucketSourceSettings};
pub use layout::{DirMatch, LayoutError, LayoutPattern};
pub use storage::{Listing, ObjectEntry, ObjectLister, StorageClient, StorageError};
pub use walker::{
    ArtifactInfo, Discovery, DiscoveryError, ListingFailure, WalkOptions, WalkStats, date_before,
    discover,
};

/// Export layout of audit log sinks writing to a bucket
pub const DEFAULT_AUDIT_LAYOUT: &str = "cloudaudit.googleapis.com/%{DATA:type}/%{YEAR:year}/%{MONTHNUM:month}/%{MONTHDAY:day}/%{HOUR:hour}:%{MINUTE:minute}:%{SECOND:second}_%{DATA:end_time}_%{DATA:suffix}.json";
