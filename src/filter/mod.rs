//! Query construction for the log API

pub mod builder;
pub mod categories;

pub use builder::{FilterBuilder, FilterError, FilterSpec, LogQuery};
pub use categories::{AUDIT_TABLE, CategoryTable, REQUESTS_TABLE};
