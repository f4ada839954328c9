use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use super::categories::CategoryTable;
use crate::state::FetchWindow;

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("resource scope is empty")]
    EmptyScope,

    #[error("no log identifiers known for table '{0}'")]
    NoIdentifiers(String),
}

/// Inputs of one query, fixed for the whole run
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub categories: Vec<String>,
    pub window: FetchWindow,
    pub scope: String,
}

/// A built query and the resources it targets
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub filter: String,
    pub resource_names: Vec<String>,
}

/// Turns categories plus a time window into a backend filter expression
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    categories: Arc<CategoryTable>,
    table: String,
}

impl FilterBuilder {
    pub fn new(categories: Arc<CategoryTable>, table: impl Into<String>) -> Self {
        Self {
            categories,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn build(&self, spec: &FilterSpec) -> Result<LogQuery, FilterError> {
        let scope = spec.scope.trim();
        if scope.is_empty() {
            return Err(FilterError::EmptyScope);
        }

        let identifiers = self.categories.resolve(&self.table, &spec.categories, scope);
        if identifiers.is_empty() {
            return Err(FilterError::NoIdentifiers(self.table.clone()));
        }

        let quoted: Vec<String> = identifiers.iter().map(|id| format!("\"{id}\"")).collect();
        let log_clause = match quoted.as_slice() {
            [single] => format!("logName={single}"),
            many => format!("logName=({})", many.join(" OR ")),
        };

        Ok(LogQuery {
            filter: format!("{log_clause} {}", time_clause(&spec.window)),
            resource_names: vec![format!("projects/{scope}")],
        })
    }
}

/// Half-open `[start, end)` range
fn time_clause(window: &FetchWindow) -> String {
    format!(
        "AND (timestamp >= \"{}\") AND (timestamp < \"{}\")",
        format_timestamp(window.start),
        format_timestamp(window.end)
    )
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
