//! Credential provider: an opaque source of client options

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no access token; set LOGBOX_ACCESS_TOKEN or GOOGLE_OAUTH_ACCESS_TOKEN")]
    MissingToken,

    #[error("credential provider failed: {0}")]
    Provider(String),
}

/// Transport option applied when a client is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOption {
    BearerToken(String),
    /// Project billed for quota, sent as `x-goog-user-project`
    QuotaProject(String),
    Endpoint(String),
    UserAgent(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn client_options(&self) -> Result<Vec<ClientOption>, CredentialError>;
}

/// Credentials resolved once at startup from configuration and environment
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    access_token: Option<String>,
    quota_project: Option<String>,
    endpoint: Option<String>,
}

impl StaticCredentials {
    pub fn new(access_token: Option<String>) -> Self {
        Self {
            access_token,
            ..Self::default()
        }
    }

    pub fn with_quota_project(mut self, quota_project: Option<String>) -> Self {
        self.quota_project = quota_project.filter(|project| !project.is_empty());
        self
    }

    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint.filter(|endpoint| !endpoint.is_empty());
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn client_options(&self) -> Result<Vec<ClientOption>, CredentialError> {
        let token = self
            .access_token
            .as_ref()
            .filter(|token| !token.trim().is_empty())
            .ok_or(CredentialError::MissingToken)?;

        let mut options = vec![ClientOption::BearerToken(token.trim().to_string())];
        if let Some(project) = &self.quota_project {
            options.push(ClientOption::QuotaProject(project.clone()));
        }
        if let Some(endpoint) = &self.endpoint {
            options.push(ClientOption::Endpoint(endpoint.clone()));
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_token_is_an_error() {
        let credentials = StaticCredentials::new(None);
        assert!(matches!(
            credentials.client_options().await,
            Err(CredentialError::MissingToken)
        ));

        let blank = StaticCredentials::new(Some("  ".to_string()));
        assert!(blank.client_options().await.is_err());
    }

    #[tokio::test]
    async fn test_options_include_quota_project() {
        let credentials = StaticCredentials::new(Some("tok".to_string()))
            .with_quota_project(Some("billing".to_string()))
            .with_endpoint(Some(String::new()));

        let options = credentials.client_options().await.unwrap();
        assert_eq!(
            options,
            vec![
                ClientOption::BearerToken("tok".to_string()),
                ClientOption::QuotaProject("billing".to_string()),
            ]
        );
    }
}
