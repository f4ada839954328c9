use super::models::{BucketSourceConfig, Config, SourceConfig, StorageProvider};
use crate::artifact::{LayoutError, LayoutPattern};
use crate::filter::CategoryTable;
use crate::retry::PolicyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(#[from] PolicyError),

    #[error("Page size must be between 1 and 1000, got {0}")]
    InvalidPageSize(u32),

    #[error("Source '{source_name}' has an empty lookback")]
    EmptyLookback { source_name: String },

    #[error("Source '{source_name}' has an empty bucket name")]
    EmptyBucket { source_name: String },

    #[error("Source '{source_name}': extension '{extension}' must start with '.'")]
    InvalidExtension {
        source_name: String,
        extension: String,
    },

    #[error("Source '{source_name}': invalid file layout: {error}")]
    InvalidLayout {
        source_name: String,
        error: LayoutError,
    },

    #[error("Source '{source_name}': since requires a 'year' field in the file layout")]
    SinceWithoutDate { source_name: String },

    #[error("Storage provider 'local' requires storage.root")]
    MissingStorageRoot,
}

const MAX_PAGE_SIZE: u32 = 1000;

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    config.retry.validate()?;
    validate_page_size(config.connection.page_size)?;
    validate_storage(config)?;

    for (name, source) in &config.sources {
        match source {
            SourceConfig::LoggingApi(api) => {
                if let Some(page_size) = api.page_size {
                    validate_page_size(page_size)?;
                }
                let lookback = api.lookback.unwrap_or(config.state.default_lookback);
                if lookback.as_duration().is_zero() {
                    return Err(ValidationError::EmptyLookback {
                        source_name: name.clone(),
                    });
                }
                warn_unknown_categories(name, &api.table, &api.categories);
            }
            SourceConfig::StorageBucket(bucket) => validate_bucket_source(name, bucket)?,
        }
    }

    Ok(())
}

fn validate_page_size(page_size: u32) -> Result<(), ValidationError> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::InvalidPageSize(page_size));
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let has_bucket_sources = config
        .sources
        .values()
        .any(|source| matches!(source, SourceConfig::StorageBucket(_)));

    if has_bucket_sources
        && config.storage.provider == StorageProvider::Local
        && config.storage.root.is_none()
    {
        return Err(ValidationError::MissingStorageRoot);
    }
    Ok(())
}

/// Unknown categories are ignored at run time, so only warn here
fn warn_unknown_categories(source: &str, table: &str, categories: &[String]) {
    let known = CategoryTable::with_defaults();
    let valid = known.known_categories(table);
    for category in categories {
        if !valid.contains(&category.as_str()) {
            tracing::warn!(source, table, category = %category, "Unknown category will be ignored");
        }
    }
}

fn validate_bucket_source(name: &str, bucket: &BucketSourceConfig) -> Result<(), ValidationError> {
    if bucket.bucket.trim().is_empty() {
        return Err(ValidationError::EmptyBucket {
            source_name: name.to_string(),
        });
    }

    if let Some(extension) = bucket.extensions.iter().find(|ext| !ext.starts_with('.')) {
        return Err(ValidationError::InvalidExtension {
            source_name: name.to_string(),
            extension: extension.clone(),
        });
    }

    let layout = compile_layout(bucket).map_err(|error| ValidationError::InvalidLayout {
        source_name: name.to_string(),
        error,
    })?;

    if bucket.since.is_some() && layout.require_fields(&["year"]).is_err() {
        return Err(ValidationError::SinceWithoutDate {
            source_name: name.to_string(),
        });
    }

    Ok(())
}

/// Compile a bucket source's layout with its custom patterns
pub fn compile_layout(bucket: &BucketSourceConfig) -> Result<LayoutPattern, LayoutError> {
    // Keys may arrive lowercased from some config sources
    let custom = bucket
        .patterns
        .iter()
        .flat_map(|(name, pattern)| {
            [
                (name.clone(), pattern.clone()),
                (name.to_uppercase(), pattern.clone()),
            ]
        })
        .collect();

    let prefix = Some(bucket.prefix.as_str()).filter(|prefix| !prefix.is_empty());
    LayoutPattern::compile(&bucket.file_layout, prefix, &custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::ApiSourceConfig;
    use crate::humanize::HumanDuration;
    use crate::state::Direction;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn bucket_source(layout: &str) -> BucketSourceConfig {
        BucketSourceConfig {
            bucket: "exports".to_string(),
            prefix: String::new(),
            table: "gcp_audit_log".to_string(),
            file_layout: layout.to_string(),
            patterns: BTreeMap::new(),
            extensions: vec![".json".to_string()],
            since: None,
        }
    }

    fn with_source(name: &str, source: SourceConfig) -> Config {
        let mut config = Config::default();
        config.sources.insert(name.to_string(), source);
        config
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_invalid_retry_policy() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidRetryPolicy(_))
        ));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = Config::default();
        config.connection.page_size = 5000;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidPageSize(5000))
        ));
    }

    #[test]
    fn test_zero_lookback_rejected() {
        let config = with_source(
            "audit",
            SourceConfig::LoggingApi(ApiSourceConfig {
                table: "gcp_audit_log".to_string(),
                categories: vec!["unknown".to_string()],
                scope: None,
                direction: Direction::Forward,
                lookback: Some(HumanDuration::from_millis(0)),
                page_size: None,
            }),
        );
        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyLookback { .. })
        ));
    }

    #[test]
    fn test_extension_must_start_with_dot() {
        let mut source = bucket_source("%{DATA:name}.json");
        source.extensions = vec!["json".to_string()];
        let config = with_source("exports", SourceConfig::StorageBucket(source));

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidExtension { extension, .. }) if extension == "json"
        ));
    }

    #[test]
    fn test_bad_layout_rejected() {
        let source = bucket_source("%{NOPE:x}/a.json");
        let config = with_source("exports", SourceConfig::StorageBucket(source));
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidLayout { .. })
        ));
    }

    #[test]
    fn test_since_requires_year_field() {
        let mut source = bucket_source("%{DATA:name}.json");
        source.since = NaiveDate::from_ymd_opt(2025, 1, 1);
        let config = with_source("exports", SourceConfig::StorageBucket(source));
        assert!(matches!(
            validate(&config),
            Err(ValidationError::SinceWithoutDate { .. })
        ));
    }

    #[test]
    fn test_local_storage_needs_root() {
        let mut config = with_source(
            "exports",
            SourceConfig::StorageBucket(bucket_source("%{DATA:name}.json")),
        );
        config.storage.provider = StorageProvider::Local;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingStorageRoot)
        ));
    }

    #[test]
    fn test_lowercase_custom_pattern_names() {
        let mut source = bucket_source("%{STAMP:stamp}.json");
        source
            .patterns
            .insert("stamp".to_string(), "%{YEAR}-%{MONTHNUM}".to_string());
        let layout = compile_layout(&source).unwrap();
        assert!(layout.match_path("2025-06.json").is_some());
    }
}
