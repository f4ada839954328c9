use crate::filter::AUDIT_TABLE;
use crate::humanize::HumanDuration;
use crate::retry::RetryPolicy;
use crate::state::Direction;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

/// Log API connection settings shared by every API source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Default scope for sources that do not set one
    pub project: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub quota_project: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    /// Access token (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            project: None,
            endpoint: default_endpoint(),
            quota_project: None,
            page_size: default_page_size(),
            connect_timeout: default_connect_timeout(),
            access_token: None,
        }
    }
}

fn default_endpoint() -> String {
    crate::api::DEFAULT_ENDPOINT.to_string()
}

fn default_page_size() -> u32 {
    crate::api::DEFAULT_PAGE_SIZE
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(10)
}

/// Collection state store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
    /// Window length of a first run
    #[serde(default = "default_lookback")]
    pub default_lookback: HumanDuration,
    #[serde(default = "default_true")]
    pub checkpoint_every_page: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
            default_lookback: default_lookback(),
            checkpoint_every_page: true,
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("data/state")
}

fn default_lookback() -> HumanDuration {
    HumanDuration::from_secs(24 * 60 * 60)
}

fn default_true() -> bool {
    true
}

/// Storage provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Gcs,
    Local,
    Memory,
}

/// Object storage backend for bucket sources
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    /// Directory holding one sub-directory per bucket (`local` provider)
    pub root: Option<PathBuf>,
    /// Overrides every source's bucket name
    pub bucket: Option<String>,
}

/// Where rows go
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// JSON-lines file; stdout when absent
    pub path: Option<PathBuf>,
}

/// One configured source
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    LoggingApi(ApiSourceConfig),
    StorageBucket(BucketSourceConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::LoggingApi(_) => "logging_api",
            SourceConfig::StorageBucket(_) => "storage_bucket",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSourceConfig {
    #[serde(default = "default_table")]
    pub table: String,
    /// Empty selects every category of the table
    #[serde(default)]
    pub categories: Vec<String>,
    /// Overrides `connection.project`
    pub scope: Option<String>,
    #[serde(default)]
    pub direction: Direction,
    /// Defaults to `state.default_lookback`
    pub lookback: Option<HumanDuration>,
    /// Defaults to `connection.page_size`
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BucketSourceConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_file_layout")]
    pub file_layout: String,
    /// Custom grok patterns usable in `file_layout`
    #[serde(default)]
    pub patterns: BTreeMap<String, String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    pub since: Option<NaiveDate>,
}

fn default_table() -> String {
    AUDIT_TABLE.to_string()
}

fn default_file_layout() -> String {
    crate::artifact::DEFAULT_AUDIT_LAYOUT.to_string()
}

fn default_extensions() -> Vec<String> {
    vec![".json".to_string()]
}
