use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "LOGBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/logbox.toml";
const ENV_PREFIX: &str = "LOGBOX";
const ENV_SEPARATOR: &str = "__";

const ACCESS_TOKEN_VARS: &[&str] = &["LOGBOX_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

/// Path of the configuration file: `LOGBOX_CONFIG` or the default location
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load(config_path: PathBuf) -> Result<Config, ConfigError> {
    // A missing .env is not an error
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Secrets are never stored in TOML files, only in the environment
fn load_secrets(config: &mut Config) {
    config.connection.access_token = ACCESS_TOKEN_VARS
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|token| !token.trim().is_empty());
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // LOGBOX__STATE__PATH -> state.path
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
