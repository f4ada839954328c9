//! Drives configured sources concurrently until done or cancelled

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::collector::{CollectReport, Collector};
use crate::error::{CollectError, Result};
use crate::sink::RowSink;
use crate::state::StateStore;

/// Outcome of one source in a multi-source run
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: String,
    pub result: Result<CollectReport>,
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every collector as its own task against a shared sink and store.
///
/// Outcomes come back sorted by source name. One source failing does not
/// stop the others; cancelling `cancel` stops all of them.
pub async fn run_sources(
    collectors: Vec<Arc<dyn Collector>>,
    sink: Arc<dyn RowSink>,
    store: StateStore,
    cancel: CancellationToken,
) -> Vec<SourceOutcome> {
    let run_id = Uuid::now_v7();
    info!(%run_id, sources = collectors.len(), "Starting collection run");
    let mut tasks = JoinSet::new();

    for collector in collectors {
        let sink = sink.clone();
        let store = store.clone();
        let cancel = cancel.clone();
        let span = info_span!("collect", %run_id, source = collector.name());
        tasks.spawn(
            async move {
                let source = collector.name().to_string();
                let result = collector.collect(&cancel, sink.as_ref(), &store).await;
                log_outcome(&source, collector.kind(), &result);
                SourceOutcome { source, result }
            }
            .instrument(span),
        );
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!(error = %e, "Collector task panicked");
                outcomes.push(SourceOutcome {
                    source: "<unknown>".to_string(),
                    result: Err(CollectError::fatal(e.to_string())),
                });
            }
        }
    }

    if let Err(e) = store.persist() {
        error!(error = %e, "Failed to persist state store");
    }

    outcomes.sort_by(|a, b| a.source.cmp(&b.source));
    outcomes
}

fn log_outcome(source: &str, kind: &str, result: &Result<CollectReport>) {
    match result {
        Ok(report) => info!(
            source,
            kind,
            rows = report.rows_emitted,
            skipped = report.rows_skipped,
            pages = report.pages,
            artifacts = report.artifacts,
            "Source completed"
        ),
        Err(CollectError::Cancelled) => info!(source, kind, "Source cancelled"),
        Err(e) => error!(source, kind, error = %e, "Source failed"),
    }
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
pub async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }
    info!("Shutdown signal received, cancelling collection");
    cancel.cancel();
}
