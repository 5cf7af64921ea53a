//! Error types for provisioning operations.
//!
//! Every failure the provisioning client can observe is one of six kinds
//! ([`FailureKind`]). Configuration problems detected while building a client
//! are reported separately as [`Error::ConfigError`] and never occur once a
//! client has been constructed.

use serde::Serialize;
use thiserror::Error;

/// Main error type for provisioning operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Caller supplied a missing or out-of-domain value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote API refused the configured credential
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Request did not complete within the configured timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection, DNS or TLS handshake failure
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Remote API answered with a non-success status
    #[error("Remote API rejected request with status {status}: {message}")]
    RemoteRejected {
        /// HTTP status code
        status: u16,
        /// Machine readable error code from the response body, if any
        code: Option<String>,
        /// Error message from the response body
        message: String,
    },

    /// Response did not match the expected payload shape
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Client configuration is unusable
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Specialized result type for provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or invalid caller input
    InvalidInput,
    /// Credential rejected
    AuthError,
    /// Request timed out
    Timeout,
    /// Network-level failure
    NetworkError,
    /// Remote API returned an error status
    RemoteRejected,
    /// Response could not be parsed
    ProtocolError,
}

impl FailureKind {
    /// Returns all failure kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::InvalidInput,
            Self::AuthError,
            Self::Timeout,
            Self::NetworkError,
            Self::RemoteRejected,
            Self::ProtocolError,
        ]
    }

    /// Returns the kind as a snake case string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::AuthError => "auth_error",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::RemoteRejected => "remote_rejected",
            Self::ProtocolError => "protocol_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::AuthError(_) => "AUTH_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::NetworkError(_) => "NETWORK_ERROR",
            Self::RemoteRejected { .. } => "REMOTE_REJECTED",
            Self::ProtocolError(_) => "PROTOCOL_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Returns the failure classification.
    ///
    /// Configuration errors are classified as invalid input: they can only be
    /// fixed by changing what the caller supplies.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) | Self::ConfigError(_) => FailureKind::InvalidInput,
            Self::AuthError(_) => FailureKind::AuthError,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::NetworkError(_) => FailureKind::NetworkError,
            Self::RemoteRejected { .. } => FailureKind::RemoteRejected,
            Self::ProtocolError(_) => FailureKind::ProtocolError,
        }
    }

    /// Returns true if the caller may reasonably retry the same request.
    ///
    /// Only transient conditions qualify: timeouts, network failures and
    /// 5xx-class rejections.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::NetworkError(_) => true,
            Self::RemoteRejected { status, .. } => *status >= 500 && *status < 600,
            _ => false,
        }
    }
}

// Conversions from external error types
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ProtocolError(err.to_string())
        } else if err.is_builder() {
            Self::InvalidInput(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ProtocolError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16) -> Error {
        Error::RemoteRejected {
            status,
            code: None,
            message: "nope".to_string(),
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            Error::InvalidInput("test".to_string()).error_code(),
            "INVALID_INPUT"
        );
        assert_eq!(Error::AuthError("test".to_string()).error_code(), "AUTH_ERROR");
        assert_eq!(Error::Timeout("test".to_string()).error_code(), "TIMEOUT");
        assert_eq!(
            Error::NetworkError("test".to_string()).error_code(),
            "NETWORK_ERROR"
        );
        assert_eq!(rejected(404).error_code(), "REMOTE_REJECTED");
        assert_eq!(
            Error::ProtocolError("test".to_string()).error_code(),
            "PROTOCOL_ERROR"
        );
        assert_eq!(
            Error::ConfigError("test".to_string()).error_code(),
            "CONFIG_ERROR"
        );
    }

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("hostname is required".to_string());
        assert_eq!(err.to_string(), "Invalid input: hostname is required");

        let err = Error::RemoteRejected {
            status: 404,
            code: Some("not_found".to_string()),
            message: "container not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Remote API rejected request with status 404: container not found"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout("t".to_string()).is_retryable());
        assert!(Error::NetworkError("n".to_string()).is_retryable());
        assert!(rejected(500).is_retryable());
        assert!(rejected(503).is_retryable());

        assert!(!rejected(404).is_retryable());
        assert!(!rejected(409).is_retryable());
        assert!(!Error::AuthError("a".to_string()).is_retryable());
        assert!(!Error::ProtocolError("p".to_string()).is_retryable());
        assert!(!Error::InvalidInput("i".to_string()).is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::ConfigError("c".to_string()).kind(),
            FailureKind::InvalidInput
        );
        assert_eq!(rejected(502).kind(), FailureKind::RemoteRejected);
        assert_eq!(
            Error::Timeout("t".to_string()).kind(),
            FailureKind::Timeout
        );
    }

    #[test]
    fn test_failure_kind_all() {
        let all = FailureKind::all();
        assert_eq!(all.len(), 6);
        assert!(all.contains(&FailureKind::ProtocolError));
    }

    #[test]
    fn test_failure_kind_serialize() {
        let json = serde_json::to_string(&FailureKind::RemoteRejected).unwrap();
        assert_eq!(json, "\"remote_rejected\"");
        assert_eq!(FailureKind::AuthError.to_string(), "auth_error");
    }

    #[test]
    fn test_from_url_parse_error() {
        let err = url::Url::parse("not a url").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::InvalidInput(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let converted: Error = err.into();
        assert!(matches!(converted, Error::ProtocolError(_)));
    }

    #[test]
    fn test_error_clone_eq() {
        let err = rejected(409);
        assert_eq!(err.clone(), err);
        assert_ne!(err, rejected(410));
    }
}
