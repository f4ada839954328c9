//! Construction-time registry of configured sources

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::api::{
    ApiCollector, ApiSourceSettings, ClientFactory, HttpClientFactory, HttpConfig,
    StaticCredentials,
};
use crate::artifact::{BucketCollector, BucketSourceSettings, StorageClient, StorageError};
use crate::collector::Collector;
use crate::config::{
    ApiSourceConfig, BucketSourceConfig, Config, ResolverError, SourceConfig, StorageProvider,
    compile_layout,
};
use crate::filter::{CategoryTable, FilterBuilder};
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Scope(#[from] ResolverError),

    #[error("source '{source_name}': {error}")]
    Storage {
        source_name: String,
        error: StorageError,
    },

    #[error("source '{source_name}': invalid file layout: {error}")]
    Layout {
        source_name: String,
        error: crate::artifact::LayoutError,
    },
}

/// Collectors by source name, plus the category table they share
#[derive(Clone)]
pub struct SourceRegistry {
    categories: Arc<CategoryTable>,
    collectors: BTreeMap<String, Arc<dyn Collector>>,
    buckets: BTreeMap<String, Arc<BucketCollector>>,
}

impl SourceRegistry {
    pub fn new(categories: Arc<CategoryTable>) -> Self {
        Self {
            categories,
            collectors: BTreeMap::new(),
            buckets: BTreeMap::new(),
        }
    }

    pub fn categories(&self) -> &Arc<CategoryTable> {
        &self.categories
    }

    pub fn register(&mut self, collector: Arc<dyn Collector>) {
        self.collectors.insert(collector.name().to_string(), collector);
    }

    pub fn register_bucket(&mut self, collector: Arc<BucketCollector>) {
        self.buckets
            .insert(collector.name().to_string(), collector.clone());
        self.register(collector);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Collector>, RegistryError> {
        self.collectors
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Bucket source by name, for discovery without collection
    pub fn bucket(&self, name: &str) -> Result<Arc<BucketCollector>, RegistryError> {
        self.buckets
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collectors.keys().map(String::as_str)
    }

    pub fn collectors(&self) -> impl Iterator<Item = &Arc<dyn Collector>> {
        self.collectors.values()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// One collector per configured source
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, RegistryError> {
        let mut registry = Self::new(Arc::new(CategoryTable::with_defaults()));
        let resolver = config.scope_resolver();

        let credentials = StaticCredentials::new(config.connection.access_token.clone())
            .with_quota_project(resolver.quota_project(config.connection.quota_project.as_deref()));
        let http = HttpConfig {
            endpoint: config.connection.endpoint.clone(),
            connect_timeout: config.connection.connect_timeout.as_duration(),
            request_timeout: config.retry.attempt_timeout(),
            ..HttpConfig::default()
        };
        let clients: Arc<dyn ClientFactory> =
            Arc::new(HttpClientFactory::new(http, Arc::new(credentials)));

        for (name, source) in &config.sources {
            match source {
                SourceConfig::LoggingApi(api) => {
                    let scope = resolver.resolve(name, api.scope.as_deref())?;
                    let collector =
                        registry.api_collector(name, scope, api, config, clients.clone(), &metrics);
                    registry.register(Arc::new(collector));
                }
                SourceConfig::StorageBucket(bucket) => {
                    let collector = bucket_collector(name, bucket, config, &metrics)?;
                    registry.register_bucket(Arc::new(collector));
                }
            }
        }

        Ok(registry)
    }

    fn api_collector(
        &self,
        name: &str,
        scope: String,
        api: &ApiSourceConfig,
        config: &Config,
        clients: Arc<dyn ClientFactory>,
        metrics: &Arc<Metrics>,
    ) -> ApiCollector {
        let mut settings = ApiSourceSettings::new(name, scope);
        settings.categories = api.categories.clone();
        settings.direction = api.direction;
        settings.lookback = api
            .lookback
            .unwrap_or(config.state.default_lookback)
            .as_duration();
        settings.page_size = api.page_size.unwrap_or(config.connection.page_size);
        settings.checkpoint_every_page = config.state.checkpoint_every_page;

        let filter = FilterBuilder::new(self.categories.clone(), &api.table);
        ApiCollector::new(settings, filter, clients, config.retry, metrics.clone())
    }
}

fn bucket_collector(
    name: &str,
    bucket: &BucketSourceConfig,
    config: &Config,
    metrics: &Arc<Metrics>,
) -> Result<BucketCollector, RegistryError> {
    let layout = compile_layout(bucket).map_err(|error| RegistryError::Layout {
        source_name: name.to_string(),
        error,
    })?;

    let bucket_name = config
        .storage
        .bucket
        .clone()
        .unwrap_or_else(|| bucket.bucket.clone());
    let client = open_storage(config, &bucket_name).map_err(|error| RegistryError::Storage {
        source_name: name.to_string(),
        error,
    })?;

    let settings = BucketSourceSettings {
        name: name.to_string(),
        bucket: bucket_name,
        table: bucket.table.clone(),
        prefix: bucket.prefix.clone(),
        extensions: bucket.extensions.clone(),
        since: bucket.since,
    };

    Ok(BucketCollector::new(
        settings,
        Arc::new(layout),
        Arc::new(client),
        config.retry,
        metrics.clone(),
    ))
}

fn open_storage(config: &Config, bucket: &str) -> Result<StorageClient, StorageError> {
    match config.storage.provider {
        StorageProvider::Gcs => StorageClient::gcs(bucket),
        StorageProvider::Memory => Ok(StorageClient::in_memory(bucket)),
        StorageProvider::Local => {
            let root = config
                .storage
                .root
                .as_ref()
                .ok_or_else(|| StorageError::InvalidPath("storage.root is not set".to_string()))?;
            StorageClient::local(root.join(bucket), bucket)
        }
    }
}
