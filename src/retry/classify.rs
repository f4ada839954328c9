//! Error classification rules for the retry controller
//!
//! Rules apply in priority order: backend status, network failure,
//! caller cancellation, then everything else is fatal.

use std::fmt;

/// Outcome of classifying a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
    /// Caller asked to stop. Never retried and never logged as an error.
    Cancellation,
}

/// Implemented by every error type that flows through a retried operation
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Canonical RPC status codes carried in backend error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl RpcCode {
    /// Parse the string form used in JSON error bodies, e.g. `RESOURCE_EXHAUSTED`
    pub fn from_status(status: &str) -> Option<Self> {
        let code = match status {
            "CANCELLED" => Self::Cancelled,
            "UNKNOWN" => Self::Unknown,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
            "NOT_FOUND" => Self::NotFound,
            "ALREADY_EXISTS" => Self::AlreadyExists,
            "PERMISSION_DENIED" => Self::PermissionDenied,
            "RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
            "FAILED_PRECONDITION" => Self::FailedPrecondition,
            "ABORTED" => Self::Aborted,
            "OUT_OF_RANGE" => Self::OutOfRange,
            "UNIMPLEMENTED" => Self::Unimplemented,
            "INTERNAL" => Self::Internal,
            "UNAVAILABLE" => Self::Unavailable,
            "DATA_LOSS" => Self::DataLoss,
            "UNAUTHENTICATED" => Self::Unauthenticated,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Transport-level failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    Timeout,
    ConnectionReset,
    ConnectionRefused,
    DnsTemporary,
    Other,
}

/// Phrases that mark an otherwise opaque error as transient
const TRANSIENT_PHRASES: &[&str] = &[
    "connection reset",
    "connection refused",
    "timeout",
    "timed out",
    "temporary failure",
    "service unavailable",
    "try again",
    "rate limit",
    "quota exceeded",
];

/// Rule 1a: HTTP statuses for overload or transient unavailability
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        429 | 500 | 502 | 503 | 504 => ErrorClass::Retryable,
        _ => ErrorClass::Fatal,
    }
}

/// Rule 1b: RPC codes for overload or transient unavailability
pub fn classify_rpc_code(code: RpcCode) -> ErrorClass {
    match code {
        RpcCode::ResourceExhausted
        | RpcCode::Unavailable
        | RpcCode::DeadlineExceeded
        | RpcCode::Aborted
        | RpcCode::Internal => ErrorClass::Retryable,
        RpcCode::Cancelled => ErrorClass::Cancellation,
        _ => ErrorClass::Fatal,
    }
}

/// Rule 2: network timeouts, resets, refusals and temporary DNS failures
pub fn classify_network(failure: NetworkFailure) -> ErrorClass {
    match failure {
        NetworkFailure::Timeout
        | NetworkFailure::ConnectionReset
        | NetworkFailure::ConnectionRefused
        | NetworkFailure::DnsTemporary => ErrorClass::Retryable,
        NetworkFailure::Other => ErrorClass::Fatal,
    }
}

/// Last resort for errors with no structured code
pub fn classify_message(message: &str) -> ErrorClass {
    let message = message.to_lowercase();
    if TRANSIENT_PHRASES.iter().any(|phrase| message.contains(phrase)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

/// Map an I/O error kind onto a network failure, when it is one
pub fn network_failure_from_io(kind: std::io::ErrorKind) -> Option<NetworkFailure> {
    use std::io::ErrorKind;

    match kind {
        ErrorKind::TimedOut => Some(NetworkFailure::Timeout),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            Some(NetworkFailure::ConnectionReset)
        }
        ErrorKind::ConnectionRefused => Some(NetworkFailure::ConnectionRefused),
        _ => None,
    }
}
