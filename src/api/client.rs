//! HTTP client for the log API

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::credentials::{ClientOption, CredentialProvider};
use super::error::FetchError;
use super::types::{EntriesPage, ListEntriesRequest, ListEntriesResponse};
use crate::retry::RpcCode;

pub type Result<T> = std::result::Result<T, FetchError>;

pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";
const LIST_ENTRIES_PATH: &str = "/v2/entries:list";

/// A paginated log backend
#[async_trait]
pub trait LogApi: Send + Sync {
    /// Fetch one page
    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntriesPage>;
}

/// Opens a client handle scoped to one run
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn LogApi>>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            user_agent: format!("logbox/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `entries:list` over REST
pub struct HttpLogApi {
    client: Client,
    url: String,
    bearer_token: Option<String>,
    quota_project: Option<String>,
}

impl HttpLogApi {
    /// Create a client, letting `options` override the configured defaults
    pub fn new(config: &HttpConfig, options: &[ClientOption]) -> Result<Self> {
        let mut endpoint = config.endpoint.clone();
        let mut user_agent = config.user_agent.clone();
        let mut bearer_token = None;
        let mut quota_project = None;

        for option in options {
            match option {
                ClientOption::BearerToken(token) => bearer_token = Some(token.clone()),
                ClientOption::QuotaProject(project) => quota_project = Some(project.clone()),
                ClientOption::Endpoint(url) => endpoint = url.clone(),
                ClientOption::UserAgent(agent) => user_agent = agent.clone(),
            }
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: format!("{}{}", endpoint.trim_end_matches('/'), LIST_ENTRIES_PATH),
            bearer_token,
            quota_project,
        })
    }
}

#[async_trait]
impl LogApi for HttpLogApi {
    async fn list_entries(&self, request: &ListEntriesRequest) -> Result<EntriesPage> {
        debug!(url = %self.url, page_token = ?request.page_token, "Listing entries");

        let mut builder = self.client.post(&self.url).json(request);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(project) = &self.quota_project {
            builder = builder.header("x-goog-user-project", project);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body, status.canonical_reason()));
        }

        let page: ListEntriesResponse = response.json().await?;
        let page = EntriesPage::from(page);
        debug!(
            entries = page.entries.len(),
            malformed = page.malformed,
            more = page.next_token().is_some(),
            "Page received"
        );
        Ok(page)
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Decode a JSON error body into an HTTP error carrying the RPC status
fn status_error(status: u16, body: &str, reason: Option<&str>) -> FetchError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => FetchError::Http {
            status,
            rpc: RpcCode::from_status(&envelope.error.status),
            message: envelope.error.message,
        },
        Err(_) => FetchError::Http {
            status,
            rpc: None,
            message: if body.trim().is_empty() {
                reason.unwrap_or("Unknown").to_string()
            } else {
                body.trim().to_string()
            },
        },
    }
}

/// Opens `HttpLogApi` handles with options from a credential provider
pub struct HttpClientFactory {
    config: HttpConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpClientFactory {
    pub fn new(config: HttpConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

#[async_trait]
impl ClientFactory for HttpClientFactory {
    async fn open(&self) -> Result<Box<dyn LogApi>> {
        let options = self.credentials.client_options().await?;
        let client = HttpLogApi::new(&self.config, &options)?;
        Ok(Box::new(client))
    }
}
