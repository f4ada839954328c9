//! Object storage access for artifact discovery and download

use std::path::Path as FsPath;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::{ObjectStore, path::Path as StoragePath};
use thiserror::Error;

use crate::retry::classify::classify_message;
use crate::retry::{Classify, ErrorClass};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Storage request timed out")]
    Timeout,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl Classify for StorageError {
    fn class(&self) -> ErrorClass {
        match self {
            StorageError::ObjectStore(object_store::Error::NotFound { .. })
            | StorageError::ObjectStore(object_store::Error::PermissionDenied { .. })
            | StorageError::ObjectStore(object_store::Error::Unauthenticated { .. })
            | StorageError::NotFound(_)
            | StorageError::InvalidPath(_) => ErrorClass::Fatal,
            StorageError::ObjectStore(other) => classify_message(&other.to_string()),
            StorageError::Timeout | StorageError::Unavailable(_) => ErrorClass::Retryable,
        }
    }
}

/// An object in a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub path: String,
    pub size: u64,
    /// Content version, when the backend reports one
    pub e_tag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One level of a delimiter-based listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Common prefixes, without the trailing delimiter
    pub directories: Vec<String>,
    pub objects: Vec<ObjectEntry>,
}

/// Hierarchical view of a bucket
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// List one directory level; `""` is the bucket root
    async fn list_dir(&self, dir: &str) -> Result<Listing>;

    async fn fetch(&self, path: &str) -> Result<Bytes>;
}

/// Storage client wrapping object_store
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
}

impl StorageClient {
    /// Create new storage client with any object_store backend
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory(bucket: impl Into<String>) -> Self {
        Self::new(Arc::new(InMemory::new()), bucket)
    }

    /// Serve a local directory as the bucket
    pub fn local<P: AsRef<FsPath>>(root: P, bucket: impl Into<String>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())
            .map_err(|e| StorageError::InvalidPath(format!("{}: {e}", root.as_ref().display())))?;
        let store = LocalFileSystem::new_with_prefix(root)?;
        Ok(Self::new(Arc::new(store), bucket))
    }

    /// Google Cloud Storage bucket, credentials from the environment
    pub fn gcs(bucket: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&bucket)
            .build()?;
        Ok(Self::new(Arc::new(store), bucket))
    }

    /// Upload bytes to storage
    pub async fn upload(&self, key: &str, data: impl Into<Bytes>) -> Result<()> {
        let path = parse_path(key)?;
        let data: Bytes = data.into();
        let size = data.len();
        self.store.put(&path, data.into()).await?;
        tracing::debug!(bucket = %self.bucket, key, size, "Uploaded to storage");
        Ok(())
    }
}

fn parse_path(path: &str) -> Result<StoragePath> {
    StoragePath::parse(path).map_err(|e| StorageError::InvalidPath(e.to_string()))
}

#[async_trait]
impl ObjectLister for StorageClient {
    async fn list_dir(&self, dir: &str) -> Result<Listing> {
        let prefix = if dir.is_empty() {
            None
        } else {
            Some(parse_path(dir)?)
        };

        let result = self.store.list_with_delimiter(prefix.as_ref()).await?;

        Ok(Listing {
            directories: result
                .common_prefixes
                .into_iter()
                .map(|path| path.as_ref().to_string())
                .collect(),
            objects: result
                .objects
                .into_iter()
                .map(|meta| ObjectEntry {
                    path: meta.location.as_ref().to_string(),
                    size: meta.size,
                    e_tag: meta.e_tag,
                    last_modified: Some(meta.last_modified),
                })
                .collect(),
        })
    }

    async fn fetch(&self, path: &str) -> Result<Bytes> {
        let location = parse_path(path)?;
        let bytes = match self.store.get(&location).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(bucket = %self.bucket, path, size = bytes.len(), "Downloaded from storage");
        Ok(bytes)
    }
}
