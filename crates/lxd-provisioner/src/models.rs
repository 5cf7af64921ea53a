//! Request and response models exchanged between resolver and transport.

use lxd_core::types::LifecycleAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods a route may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Returns the method name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Put => Self::PUT,
            HttpMethod::Patch => Self::PATCH,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// How a successful response body is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseShape {
    /// The body is not inspected
    #[default]
    Ignore,
    /// The body must be JSON; `pointer` optionally selects the payload
    Json {
        /// JSON pointer (RFC 6901) to the payload inside the body
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pointer: Option<String>,
    },
}

/// A fully built request, ready for the transport.
#[derive(Clone, PartialEq)]
pub struct RemoteRequest {
    /// Action the request performs
    pub action: LifecycleAction,
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the endpoint base URL, query string included
    pub path: String,
    /// JSON body
    pub body: Option<Value>,
    /// Expected response shape
    pub response: ResponseShape,
}

// Bodies may carry passwords, so Debug only reports their presence.
impl std::fmt::Debug for RemoteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteRequest")
            .field("action", &self.action)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("has_body", &self.body.is_some())
            .field("response", &self.response)
            .finish()
    }
}

/// Outcome of resolving an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Nothing to send; the action succeeds locally
    NoOp,
    /// Request to send to the remote API
    Remote(RemoteRequest),
}

/// Successful response from the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePayload {
    /// HTTP status code
    pub status: u16,
    /// Parsed payload, present when the route expects JSON
    pub body: Option<Value>,
}

/// Classified result of one transport call.
pub type TransportOutcome = lxd_core::Result<RemotePayload>;

/// Error body returned by the remote API, read leniently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteErrorBody {
    /// Machine readable code (`error_code` or `code`)
    pub code: Option<String>,
    /// Message (`error` or `message`)
    pub message: Option<String>,
}

impl RemoteErrorBody {
    /// Parse a response body, returning the default when it is not a JSON object.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
            return Self::default();
        };

        let scalar = |keys: &[&str]| {
            keys.iter().find_map(|key| match map.get(*key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
        };

        Self {
            code: scalar(&["error_code", "code"]),
            message: scalar(&["error", "message"]),
        }
    }
}
