use thiserror::Error;

use crate::retry::classify::{
    classify_http_status, classify_message, classify_network, classify_rpc_code,
    network_failure_from_io,
};
use crate::retry::{Classify, ErrorClass, NetworkFailure, RpcCode};

use super::credentials::CredentialError;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}{}: {message}", .rpc.map(|code| format!(" ({code})")).unwrap_or_default())]
    Http {
        status: u16,
        rpc: Option<RpcCode>,
        message: String,
    },

    #[error("network error ({failure:?}): {message}")]
    Network {
        failure: NetworkFailure,
        message: String,
    },

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    #[error("request cancelled")]
    Cancelled,

    #[error("cannot decode response: {0}")]
    Decode(String),

    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),

    #[error("client setup failed: {0}")]
    Client(String),

    #[error("{0}")]
    Other(String),
}

impl Classify for FetchError {
    fn class(&self) -> ErrorClass {
        match self {
            FetchError::Http { status, rpc, .. } => {
                let by_rpc = rpc.map(classify_rpc_code);
                if classify_http_status(*status) == ErrorClass::Retryable
                    || by_rpc == Some(ErrorClass::Retryable)
                {
                    ErrorClass::Retryable
                } else {
                    // Server-side CANCELLED is not a caller cancellation
                    ErrorClass::Fatal
                }
            }
            FetchError::Network { failure, message } => match classify_network(*failure) {
                ErrorClass::Retryable => ErrorClass::Retryable,
                _ => classify_message(message),
            },
            FetchError::DeadlineExceeded => ErrorClass::Retryable,
            FetchError::Cancelled => ErrorClass::Cancellation,
            FetchError::Other(message) => classify_message(message),
            FetchError::Decode(_) | FetchError::Credentials(_) | FetchError::Client(_) => {
                ErrorClass::Fatal
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return FetchError::Decode(error.to_string());
        }
        if error.is_builder() {
            return FetchError::Client(error.to_string());
        }
        FetchError::Network {
            failure: network_failure(&error),
            message: error_chain(&error),
        }
    }
}

fn network_failure(error: &reqwest::Error) -> NetworkFailure {
    if error.is_timeout() {
        return NetworkFailure::Timeout;
    }

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if let Some(failure) = network_failure_from_io(io.kind()) {
                return failure;
            }
        }
        source = cause.source();
    }

    let message = error_chain(error).to_lowercase();
    if message.contains("dns") && (message.contains("temporary") || message.contains("try again")) {
        NetworkFailure::DnsTemporary
    } else {
        NetworkFailure::Other
    }
}

/// The error and all its causes on one line
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, rpc: Option<RpcCode>) -> FetchError {
        FetchError::Http {
            status,
            rpc,
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert_eq!(http(429, None).class(), ErrorClass::Retryable);
        assert_eq!(
            http(429, Some(RpcCode::ResourceExhausted)).class(),
            ErrorClass::Retryable
        );
        assert_eq!(http(409, Some(RpcCode::Aborted)).class(), ErrorClass::Retryable);
    }

    #[test]
    fn test_client_errors_are_fatal() {
        assert_eq!(
            http(400, Some(RpcCode::InvalidArgument)).class(),
            ErrorClass::Fatal
        );
        assert_eq!(http(403, Some(RpcCode::PermissionDenied)).class(), ErrorClass::Fatal);
        assert_eq!(http(499, Some(RpcCode::Cancelled)).class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_deadline_and_cancel() {
        assert_eq!(FetchError::DeadlineExceeded.class(), ErrorClass::Retryable);
        assert_eq!(FetchError::Cancelled.class(), ErrorClass::Cancellation);
    }

    #[test]
    fn test_network_and_message_fallback() {
        let reset = FetchError::Network {
            failure: NetworkFailure::ConnectionReset,
            message: "reset".to_string(),
        };
        assert_eq!(reset.class(), ErrorClass::Retryable);

        let opaque = FetchError::Network {
            failure: NetworkFailure::Other,
            message: "error sending request: Service Unavailable".to_string(),
        };
        assert_eq!(opaque.class(), ErrorClass::Retryable);

        assert_eq!(FetchError::Other("bad filter".to_string()).class(), ErrorClass::Fatal);
        assert_eq!(FetchError::Decode("x".to_string()).class(), ErrorClass::Fatal);
    }

    #[test]
    fn test_display_includes_rpc_code() {
        let error = http(429, Some(RpcCode::ResourceExhausted));
        assert_eq!(error.to_string(), "HTTP 429 (ResourceExhausted): boom");
    }
}
