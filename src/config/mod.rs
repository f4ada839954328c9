//! Configuration management for logbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use logbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("State store at: {}", config.state.path.display());
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `LOGBOX__<section>__<key>`
//!
//! Examples:
//! - `LOGBOX__CONNECTION__PROJECT=my-project`
//! - `LOGBOX__RETRY__MAX_ATTEMPTS=8`
//! - `LOGBOX__STATE__DEFAULT_LOOKBACK=6h`
//!
//! The access token is read only from `LOGBOX_ACCESS_TOKEN` or
//! `GOOGLE_OAUTH_ACCESS_TOKEN`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/logbox.toml`.
//! This can be overridden using the `LOGBOX_CONFIG` environment variable.

mod models;
mod resolver;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    ApiSourceConfig, BucketSourceConfig, Config, ConnectionConfig, OutputConfig, SourceConfig,
    StateConfig, StorageConfig, StorageProvider,
};
pub use resolver::{ResolverError, ScopeResolver};
pub use sources::config_path;
pub use validation::{ValidationError, compile_layout};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Failed to render configuration: {0}")]
    RenderError(#[from] toml::ser::Error),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`LOGBOX__*`)
    /// 2. TOML file (default: `config/logbox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(sources::config_path())
    }

    /// Load configuration from a specific path, secrets included
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load and validate a file without reading secrets from the environment
    pub fn from_file(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Scope resolver backed by this configuration and the process environment
    pub fn scope_resolver(&self) -> ScopeResolver<'_> {
        ScopeResolver::new(self.connection.project.as_deref())
    }

    /// Effective configuration as TOML; secrets are never included
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[sources.audit]
kind = "logging_api"
scope = "my-project"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::from_file(config_path).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources["audit"].kind(), "logging_api");
    }

    #[test]
    fn test_validation_catches_bad_extension() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[sources.exports]
kind = "storage_bucket"
bucket = "exports"
extensions = ["log"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::from_file(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::InvalidExtension { .. })
        ));
    }

    #[test]
    fn test_render_effective_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[connection]
project = "my-project"

[retry]
max_delay = "30s"

[sources.audit]
kind = "logging_api"
categories = ["activity"]
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::from_file(config_path).unwrap();
        let rendered = config.to_toml().unwrap();

        assert!(rendered.contains("project = \"my-project\""));
        assert!(rendered.contains("max_delay = \"30s\""));
        assert!(rendered.contains("kind = \"logging_api\""));
        assert!(!rendered.contains("access_token"));
    }
}
