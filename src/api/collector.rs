//! API collector: one resumable, paginated collection run per invocation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{ClientFactory, LogApi};
use super::error::FetchError;
use super::types::{DEFAULT_PAGE_SIZE, EntriesPage, ListEntriesRequest};
use crate::collector::{CollectReport, Collector};
use crate::error::{CollectError, Result};
use crate::filter::{FilterBuilder, FilterSpec, LogQuery};
use crate::observability::Metrics;
use crate::retry::{RetryController, RetryDecision, RetryPolicy};
use crate::sink::{RawRow, RowSink, SourceEnrichment};
use crate::state::keys::last_run_meta;
use crate::state::{CollectionState, Direction, StateStore};

/// Per-source settings for an API collector
#[derive(Debug, Clone)]
pub struct ApiSourceSettings {
    pub name: String,
    pub categories: Vec<String>,
    pub scope: String,
    pub direction: Direction,
    pub lookback: Duration,
    pub page_size: u32,
    pub checkpoint_every_page: bool,
}

impl ApiSourceSettings {
    pub fn new(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categories: Vec::new(),
            scope: scope.into(),
            direction: Direction::Forward,
            lookback: Duration::from_secs(24 * 3600),
            page_size: DEFAULT_PAGE_SIZE,
            checkpoint_every_page: true,
        }
    }
}

/// Collects one source from the log API, parameterized by its filter builder
pub struct ApiCollector {
    settings: ApiSourceSettings,
    filter: FilterBuilder,
    clients: Arc<dyn ClientFactory>,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

/// Why a page did not complete
enum Interrupt {
    Sink(crate::sink::SinkError),
    Fetch(FetchError),
}

impl ApiCollector {
    pub fn new(
        settings: ApiSourceSettings,
        filter: FilterBuilder,
        clients: Arc<dyn ClientFactory>,
        policy: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            settings,
            filter,
            clients,
            policy,
            metrics,
        }
    }

    pub fn settings(&self) -> &ApiSourceSettings {
        &self.settings
    }

    fn enrichment(&self) -> SourceEnrichment {
        SourceEnrichment::new(&self.settings.name, self.filter.table(), &self.settings.scope)
    }

    /// Open a client; any failure other than cancellation is a setup error
    async fn connect(&self, cancel: &CancellationToken) -> Result<Box<dyn LogApi>> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CollectError::Cancelled),
            opened = self.clients.open() => opened.map_err(|e| match e {
                FetchError::Cancelled => CollectError::Cancelled,
                other => CollectError::Setup(other.to_string()),
            }),
        }
    }

    /// Fetch one page, bounded by the per-attempt timeout
    async fn fetch_page(
        &self,
        client: &dyn LogApi,
        request: &ListEntriesRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<EntriesPage, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = tokio::time::timeout(self.policy.attempt_timeout(), client.list_entries(request)) => {
                result.unwrap_or(Err(FetchError::DeadlineExceeded))
            }
        }
    }

    /// Emit every new record of a page, accepting each only after the sink took it
    async fn emit_page(
        &self,
        page: EntriesPage,
        state: &mut CollectionState,
        sink: &dyn RowSink,
        enrichment: &SourceEnrichment,
        report: &mut CollectReport,
    ) -> std::result::Result<(), Interrupt> {
        let mut emitted = 0;
        if page.malformed > 0 {
            self.metrics.rows_skipped(page.malformed);
            report.rows_skipped += page.malformed;
        }

        for entry in page.entries {
            if !state.should_accept(entry.timestamp, &entry.insert_id) {
                self.metrics.row_skipped();
                report.rows_skipped += 1;
                continue;
            }

            let row = RawRow::structured(entry.raw, entry.timestamp, &entry.insert_id);
            sink.emit(row, enrichment).await.map_err(Interrupt::Sink)?;
            state.accept(entry.timestamp, &entry.insert_id);
            emitted += 1;
        }

        self.metrics.rows_emitted(emitted);
        report.rows_emitted += emitted;
        Ok(())
    }

    async fn run_pages(
        &self,
        client: &dyn LogApi,
        query: &LogQuery,
        state: &mut CollectionState,
        cancel: &CancellationToken,
        sink: &dyn RowSink,
        store: &StateStore,
        report: &mut CollectReport,
    ) -> Result<()> {
        let name = self.settings.name.as_str();
        let enrichment = self.enrichment();
        let mut controller = RetryController::new(&self.policy);
        let mut page_token: Option<String> = None;
        let mut progressed = false;

        loop {
            if cancel.is_cancelled() {
                return Err(CollectError::Cancelled);
            }

            let request = ListEntriesRequest::builder()
                .resource_names(query.resource_names.clone())
                .filter(query.filter.clone())
                .page_size(self.settings.page_size)
                .maybe_page_token(page_token.clone())
                .build();

            let outcome = match self.fetch_page(client, &request, cancel).await {
                Ok(page) => {
                    self.metrics.page_fetched();
                    report.pages += 1;
                    let next = page.next_token().map(str::to_string);
                    self.emit_page(page, state, sink, &enrichment, report)
                        .await
                        .map(|()| next)
                }
                Err(error) => Err(Interrupt::Fetch(error)),
            };

            match outcome {
                Ok(Some(next)) => {
                    progressed = true;
                    if self.settings.checkpoint_every_page {
                        if let Some(checkpoint) = state.checkpoint(Utc::now()) {
                            // Rows must be durable before the cursor passes them
                            sink.flush().await?;
                            store.save(name, &checkpoint)?;
                        }
                    }
                    debug!(source = name, page = report.pages, "Page complete");
                    page_token = Some(next);
                }
                Ok(None) => return Ok(()),
                Err(Interrupt::Sink(error)) => {
                    warn!(source = name, error = %error, "Sink rejected a row, aborting run");
                    return Err(CollectError::Sink(error));
                }
                Err(Interrupt::Fetch(error)) => {
                    match controller.decide(&error, progressed) {
                        RetryDecision::Retry { attempt, delay } => {
                            self.metrics.retry();
                            warn!(
                                source = name,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "Transient failure, resuming from current page"
                            );
                            controller
                                .wait(delay, cancel)
                                .await
                                .map_err(|_| CollectError::Cancelled)?;
                        }
                        RetryDecision::Exhausted { attempts } => {
                            warn!(source = name, attempts, error = %error, "Retries exhausted");
                            return Err(CollectError::exhausted(attempts, error));
                        }
                        RetryDecision::Fatal => return Err(CollectError::fatal(error)),
                        RetryDecision::Cancelled => return Err(CollectError::Cancelled),
                    }
                    progressed = false;
                }
            }
        }
    }
}

#[async_trait]
impl Collector for ApiCollector {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn kind(&self) -> &'static str {
        "logging_api"
    }

    async fn collect(
        &self,
        cancel: &CancellationToken,
        sink: &dyn RowSink,
        store: &StateStore,
    ) -> Result<CollectReport> {
        let name = self.settings.name.as_str();
        let mut report = CollectReport {
            source: name.to_string(),
            ..CollectReport::default()
        };

        let prior = store.load(name)?;
        let mut state = CollectionState::begin(
            self.settings.direction,
            self.settings.lookback,
            prior,
            Utc::now(),
        );
        let window = state.window();

        let query = self
            .filter
            .build(&FilterSpec {
                categories: self.settings.categories.clone(),
                window,
                scope: self.settings.scope.clone(),
            })
            .map_err(|e| CollectError::Setup(e.to_string()))?;

        info!(
            source = name,
            scope = %self.settings.scope,
            direction = %self.settings.direction,
            window_start = %window.start,
            window_end = %window.end,
            "Starting collection"
        );

        if !window.is_empty() {
            // The client lives only for this block and is dropped on every exit
            let client = self.connect(cancel).await?;
            self.run_pages(client.as_ref(), &query, &mut state, cancel, sink, store, &mut report)
                .await?;
        }

        sink.flush().await?;
        store.save(name, &state.end(Utc::now()))?;
        store.set_meta(&last_run_meta(name), &Utc::now().to_rfc3339())?;

        info!(
            source = name,
            rows = report.rows_emitted,
            skipped = report.rows_skipped,
            pages = report.pages,
            "Collection complete"
        );
        Ok(report)
    }
}
