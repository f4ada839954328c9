//! Incremental collector for cloud audit logs.
//!
//! Two source kinds feed one row sink: the log API, read page by page through
//! a persisted time-window cursor, and bucket exports, discovered by walking
//! object storage against a file-layout pattern.

pub mod api;
pub mod artifact;
pub mod collector;
pub mod config;
pub mod error;
pub mod filter;
pub mod humanize;
pub mod observability;
pub mod registry;
pub mod retry;
pub mod runner;
pub mod sink;
pub mod state;
