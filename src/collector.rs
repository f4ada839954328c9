//! The contract every source implements

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::sink::RowSink;
use crate::state::StateStore;

/// Summary of one completed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectReport {
    pub source: String,
    pub rows_emitted: u64,
    pub rows_skipped: u64,
    pub pages: u64,
    pub artifacts: u64,
}

/// One configured source. A run either completes and advances its cursor or
/// fails and leaves the previous cursor intact.
#[async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> &'static str;

    async fn collect(
        &self,
        cancel: &CancellationToken,
        sink: &dyn RowSink,
        store: &StateStore,
    ) -> Result<CollectReport>;
}
