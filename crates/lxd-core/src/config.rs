//! Configuration structures for reaching a container platform endpoint.
//!
//! A [`ServerEndpoint`] is supplied once per host server configuration and
//! stays immutable for every request sent to it.

use crate::error::{Error, Result};
use crate::types::{DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use url::Url;
use validator::Validate;

/// Default header used for token credentials.
pub const DEFAULT_TOKEN_HEADER: &str = "Authorization";
/// Default scheme prefixed to token credentials.
pub const DEFAULT_TOKEN_SCHEME: &str = "Bearer";

/// Network address and credential of a remote container platform.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerEndpoint {
    /// Hostname or IP address
    #[validate(length(min = 1, max = 253))]
    pub host: String,

    /// TCP port
    #[validate(range(min = 1))]
    pub port: u16,

    /// Whether to use HTTPS
    #[serde(default = "default_secure")]
    pub secure: bool,

    /// Whether to verify the server certificate
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path prefix for every request (e.g. `/1.0`)
    #[serde(default)]
    pub path_prefix: String,

    /// Credential presented on every request
    #[serde(default)]
    pub credential: Credential,
}

const fn default_secure() -> bool {
    true
}

const fn default_tls_verify() -> bool {
    true
}

/// Credential used to authenticate against the remote API.
///
/// The header shape differs per deployment, so token credentials carry the
/// header name and scheme alongside the secret.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credential {
    /// No authentication
    #[default]
    None,

    /// Secret token sent in a request header
    Token {
        /// Header name
        #[serde(default = "default_token_header")]
        header: String,
        /// Scheme prefix (e.g. `Bearer`); omitted when empty
        #[serde(default = "default_token_scheme")]
        scheme: String,
        /// Token value
        token: SecretString,
    },

    /// User and key pair sent as HTTP basic authentication
    Basic {
        /// Username
        username: String,
        /// Key or password
        key: SecretString,
    },

    /// TLS client certificate and private key in one PEM bundle
    ClientCertificate {
        /// PEM encoded certificate chain followed by the private key
        identity_pem: SecretString,
    },
}

fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}

fn default_token_scheme() -> String {
    DEFAULT_TOKEN_SCHEME.to_string()
}

impl Credential {
    /// Token credential using the default `Authorization: Bearer` shape.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Token {
            header: default_token_header(),
            scheme: default_token_scheme(),
            token: SecretString::from(token.into()),
        }
    }

    /// Token credential sent verbatim in a custom header.
    #[must_use]
    pub fn header(header: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Token {
            header: header.into(),
            scheme: String::new(),
            token: SecretString::from(token.into()),
        }
    }

    /// User and key credential.
    #[must_use]
    pub fn basic(username: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            key: SecretString::from(key.into()),
        }
    }

    /// Returns the credential type as a string, safe to log.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Token { .. } => "token",
            Self::Basic { .. } => "basic",
            Self::ClientCertificate { .. } => "client_certificate",
        }
    }

    /// Returns the header name and value for token credentials.
    #[must_use]
    pub fn header_value(&self) -> Option<(&str, String)> {
        match self {
            Self::Token {
                header,
                scheme,
                token,
            } => {
                let value = if scheme.is_empty() {
                    token.expose_secret().to_string()
                } else {
                    format!("{scheme} {}", token.expose_secret())
                };
                Some((header.as_str(), value))
            }
            _ => None,
        }
    }
}

impl ServerEndpoint {
    /// Create an endpoint with the default port for the chosen transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is empty or too long.
    pub fn new(host: impl Into<String>, secure: bool) -> Result<Self> {
        let port = if secure {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        };
        let endpoint = Self {
            host: host.into(),
            port,
            secure,
            tls_verify: default_tls_verify(),
            path_prefix: String::new(),
            credential: Credential::None,
        };

        endpoint.validate().map_err(|e| {
            Error::InvalidInput(format!("Invalid server endpoint: {e}"))
        })?;

        Ok(endpoint)
    }

    /// Set the port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set whether to verify TLS certificates.
    #[must_use]
    pub const fn with_tls_verify(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Set the path prefix prepended to every request path.
    #[must_use]
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Set the credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Returns `https` or `http`.
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        if self.secure {
            "https"
        } else {
            "http"
        }
    }

    /// Build the base URL every request path is joined onto.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if host, port and prefix do not form a
    /// valid URL.
    pub fn base_url(&self) -> Result<Url> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let prefix = self.path_prefix.trim_matches('/');
        let raw = if prefix.is_empty() {
            format!("{}://{host}:{}/", self.scheme(), self.port)
        } else {
            format!("{}://{host}:{}/{prefix}/", self.scheme(), self.port)
        };

        Url::parse(&raw)
            .map_err(|e| Error::InvalidInput(format!("Invalid server endpoint `{raw}`: {e}")))
    }

    /// Key identifying the connection settings of this endpoint.
    ///
    /// Endpoints with equal keys can share one pooled HTTP client. Secrets
    /// contribute only through a hash.
    #[must_use]
    pub fn pool_key(&self) -> String {
        let identity = match &self.credential {
            Credential::ClientCertificate { identity_pem } => {
                let mut hasher = DefaultHasher::new();
                identity_pem.expose_secret().hash(&mut hasher);
                format!("{:016x}", hasher.finish())
            }
            _ => "none".to_string(),
        };
        format!(
            "{}://{}:{}|verify={}|identity={identity}",
            self.scheme(),
            self.host,
            self.port,
            self.tls_verify
        )
    }
}
