//! Resolution of per-source settings that may come from the environment

use std::env;
use thiserror::Error;

const PROJECT_ENV_VARS: &[&str] = &["CLOUDSDK_CORE_PROJECT", "GCP_PROJECT"];
const QUOTA_PROJECT_ENV_VAR: &str = "GOOGLE_CLOUD_QUOTA_PROJECT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("source '{0}' has no scope; set scope, connection.project, CLOUDSDK_CORE_PROJECT or GCP_PROJECT")]
    MissingScope(String),
}

/// Scope lookup chain: source override, then the connection project, then
/// the environment.
pub struct ScopeResolver<'a> {
    default_project: Option<&'a str>,
    lookup: Box<dyn Fn(&str) -> Option<String> + 'a>,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(default_project: Option<&'a str>) -> Self {
        Self::with_lookup(default_project, |name| env::var(name).ok())
    }

    /// Resolver reading variables through `lookup` instead of the process environment
    pub fn with_lookup(
        default_project: Option<&'a str>,
        lookup: impl Fn(&str) -> Option<String> + 'a,
    ) -> Self {
        Self {
            default_project,
            lookup: Box::new(lookup),
        }
    }

    pub fn resolve(&self, source: &str, scope: Option<&str>) -> Result<String, ResolverError> {
        let explicit = [scope, self.default_project]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .map(str::to_string);

        explicit
            .or_else(|| {
                PROJECT_ENV_VARS
                    .iter()
                    .filter_map(|name| (self.lookup)(name))
                    .map(|value| value.trim().to_string())
                    .find(|value| !value.is_empty())
            })
            .ok_or_else(|| ResolverError::MissingScope(source.to_string()))
    }

    /// Configured quota project, else `GOOGLE_CLOUD_QUOTA_PROJECT`
    pub fn quota_project(&self, configured: Option<&str>) -> Option<String> {
        configured
            .map(str::to_string)
            .or_else(|| (self.lookup)(QUOTA_PROJECT_ENV_VAR))
            .filter(|project| !project.trim().is_empty())
    }
}
