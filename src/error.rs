//! Run-level error taxonomy

use thiserror::Error;

use crate::artifact::DiscoveryError;
use crate::sink::SinkError;
use crate::state::StateError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How a collection run ended when it did not complete
#[derive(Debug, Error)]
pub enum CollectError {
    /// Scope, identity or client could not be set up. Never retried.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The row sink rejected a record
    #[error("sink failed: {0}")]
    Sink(#[from] SinkError),

    /// Caller-requested stop; nothing was persisted for the run
    #[error("collection cancelled")]
    Cancelled,

    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("fatal error: {0}")]
    Fatal(#[source] BoxError),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    /// Some subtrees could not be listed; everything else was collected
    #[error(transparent)]
    PartialDiscovery(#[from] DiscoveryError),
}

impl CollectError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CollectError::Cancelled)
    }

    pub fn fatal(error: impl Into<BoxError>) -> Self {
        CollectError::Fatal(error.into())
    }

    pub fn exhausted(attempts: u32, error: impl Into<BoxError>) -> Self {
        CollectError::RetriesExhausted {
            attempts,
            source: error.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectError>;
