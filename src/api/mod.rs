//! Log API path: client, credentials and the paginated collector
//!
//! ## Key Components
//!
//! - [`LogApi`] - one page of `entries:list`
//! - [`ClientFactory`] - opens a client handle scoped to one run
//! - [`CredentialProvider`] - opaque source of [`ClientOption`]s
//! - [`ApiCollector`] - the resumable collection loop
//!
//! ## Example
//!
//! ```rust,ignore
//! let factory = Arc::new(HttpClientFactory::new(HttpConfig::default(), credentials));
//! let collector = ApiCollector::new(settings, filter, factory, policy, metrics);
//! let report = collector.collect(&cancel, &sink, &store).await?;
//! ```

mod client;
mod collector;
mod credentials;
mod error;
mod types;

pub use client::{ClientFactory, DEFAULT_ENDPOINT, HttpClientFactory, HttpConfig, HttpLogApi, LogApi};
pub use collector::{ApiCollector, ApiSourceSettings};
pub use credentials::{ClientOption, CredentialError, CredentialProvider, StaticCredentials};
pub use error::FetchError;
pub use types::{DEFAULT_PAGE_SIZE, EntriesPage, ListEntriesRequest, LogEntry, ORDER_TIMESTAMP_ASC};
