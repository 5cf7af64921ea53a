//! Conversion of typed outcomes into the host-facing result contract.
//!
//! This is the single place where an [`Error`] becomes an
//! [`ApiResult::Failed`]. Every failure carries a short `reason` that can be
//! shown to an administrator and a `detail` meant for operator logs only.

use crate::models::TransportOutcome;
use lxd_core::types::LifecycleAction;
use lxd_core::{Error, FailureKind};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// Host-facing success marker for lifecycle calls.
pub const SUCCESS: &str = "success";

/// Longest remote message quoted in a failure reason, in characters.
pub const MAX_REASON_MESSAGE: usize = 200;

/// Classified failure of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Failure classification
    pub kind: FailureKind,
    /// Short message, safe to show to an administrator
    pub reason: String,
    /// Full diagnostic, for operator logs
    pub detail: String,
    /// Whether the caller may retry the same request
    pub retryable: bool,
}

/// The outcome of one invocation as seen by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiResult {
    /// The action succeeded, optionally returning a payload
    Ok {
        /// Payload for query actions
        payload: Option<Value>,
    },
    /// The action failed
    Failed(Failure),
}

impl ApiResult {
    /// Successful result without payload.
    #[must_use]
    pub const fn ok() -> Self {
        Self::Ok { payload: None }
    }

    /// Returns true for successful results.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Ok { .. } => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Returns the payload of a successful result.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Ok { payload } => payload.as_ref(),
            Self::Failed(_) => None,
        }
    }

    /// The lifecycle contract: `"success"` or the failure reason.
    #[must_use]
    pub fn to_host_string(&self) -> String {
        match self {
            Self::Ok { .. } => SUCCESS.to_string(),
            Self::Failed(failure) => failure.reason.clone(),
        }
    }
}

/// Result of a connectivity check, in the host's binary contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTestResult {
    /// Whether the endpoint answered and accepted the credential
    pub success: bool,
    /// Empty on success, the failure reason otherwise
    pub error: String,
}

impl From<&ApiResult> for ConnectionTestResult {
    fn from(result: &ApiResult) -> Self {
        match result {
            ApiResult::Ok { .. } => Self {
                success: true,
                error: String::new(),
            },
            ApiResult::Failed(failure) => Self {
                success: false,
                error: failure.reason.clone(),
            },
        }
    }
}

/// Translate the outcome of an action into an [`ApiResult`].
///
/// Total over every outcome: successes keep their payload, failures always
/// get a non-empty reason.
#[must_use]
pub fn translate(action: LifecycleAction, outcome: TransportOutcome) -> ApiResult {
    match outcome {
        Ok(payload) => ApiResult::Ok {
            payload: payload.body,
        },
        Err(err) => ApiResult::Failed(failure(action.name(), &err)),
    }
}

/// Build the [`Failure`] describing an error raised while performing `action`.
///
/// `action` is a label, so failures that happen before an action is known
/// (an unrecognised verb) can still be described.
#[must_use]
pub fn failure(action: &str, err: &Error) -> Failure {
    Failure {
        kind: err.kind(),
        reason: reason(err),
        detail: format!("[{}] action={action} {err}", err.error_code()),
        retryable: err.is_retryable(),
    }
}

fn reason(err: &Error) -> String {
    let text = match err {
        Error::InvalidInput(message) | Error::ConfigError(message) => message.clone(),
        Error::AuthError(_) => {
            "Authentication with the container platform failed; check the server credentials"
                .to_string()
        }
        Error::Timeout(_) => {
            "The container platform did not respond in time; the request can be retried"
                .to_string()
        }
        Error::NetworkError(_) => {
            "Could not reach the container platform; the request can be retried".to_string()
        }
        Error::RemoteRejected {
            status, message, ..
        } if (500..600).contains(status) => format!(
            "The container platform is unavailable ({}); retry later",
            quote_remote(*status, message)
        ),
        Error::RemoteRejected {
            status, message, ..
        } => format!(
            "The container platform rejected the request: {}",
            quote_remote(*status, message)
        ),
        Error::ProtocolError(_) => {
            "The container platform returned an unexpected response".to_string()
        }
    };

    if text.trim().is_empty() {
        format!("{} failed", err.kind())
    } else {
        text
    }
}

/// Shorten a remote message for display. Markup (proxy error pages) is
/// replaced by the status reason phrase; the full text stays in `detail`.
fn quote_remote(status: u16, message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() || collapsed.starts_with('<') {
        return StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .map_or_else(|| format!("HTTP {status}"), str::to_string);
    }
    if collapsed.chars().count() <= MAX_REASON_MESSAGE {
        return collapsed;
    }
    let mut short: String = collapsed.chars().take(MAX_REASON_MESSAGE).collect();
    short.push_str("...");
    short
}
