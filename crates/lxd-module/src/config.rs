//! Deployment configuration for the module.
//!
//! The host stores one JSON document per deployment. It carries the route
//! table describing the remote API, the plan option sets, HTTP client tuning
//! and how endpoint parameters are turned into credentials.

use lxd_core::client::ClientConfig;
use lxd_core::config::{DEFAULT_TOKEN_HEADER, DEFAULT_TOKEN_SCHEME};
use lxd_core::types::PlanOptions;
use lxd_core::{Error, Result};
use lxd_provisioner::RouteTable;
use serde::Deserialize;
use validator::Validate;

/// Complete module configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ModuleConfig {
    /// HTTP client settings
    #[validate(nested)]
    #[serde(default)]
    pub client: ClientConfig,

    /// Published plan sizes
    #[serde(default)]
    pub plans: PlanOptions,

    /// Request templates per action
    pub routes: RouteTable,

    /// How server parameters become an endpoint
    #[validate(nested)]
    #[serde(default)]
    pub endpoint: EndpointDefaults,
}

/// Endpoint settings that the host's server parameters do not carry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Validate)]
pub struct EndpointDefaults {
    /// Header the access hash is sent in
    #[validate(length(min = 1))]
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Scheme prefixed to the access hash; empty sends it verbatim
    #[serde(default = "default_token_scheme")]
    pub token_scheme: String,

    /// Path prefix prepended to every route (e.g. `/1.0`)
    #[serde(default)]
    pub path_prefix: String,

    /// Whether to verify server certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
}

fn default_token_header() -> String {
    DEFAULT_TOKEN_HEADER.to_string()
}

fn default_token_scheme() -> String {
    DEFAULT_TOKEN_SCHEME.to_string()
}

const fn default_tls_verify() -> bool {
    true
}

impl Default for EndpointDefaults {
    fn default() -> Self {
        Self {
            token_header: default_token_header(),
            token_scheme: default_token_scheme(),
            path_prefix: String::new(),
            tls_verify: default_tls_verify(),
        }
    }
}

impl ModuleConfig {
    /// Create a configuration with default settings around a route table.
    #[must_use]
    pub fn new(routes: RouteTable) -> Self {
        Self {
            client: ClientConfig::default(),
            plans: PlanOptions::default(),
            routes,
            endpoint: EndpointDefaults::default(),
        }
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed or any
    /// section fails validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid module configuration: {e}")))?;
        config.check()?;
        Ok(config)
    }

    /// Set the plan options.
    #[must_use]
    pub fn with_plans(mut self, plans: PlanOptions) -> Self {
        self.plans = plans;
        self
    }

    /// Set the HTTP client configuration.
    #[must_use]
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Set the endpoint defaults.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: EndpointDefaults) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first problem found.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.routes.validate()?;

        let empty = [
            ("cores", self.plans.cores.is_empty()),
            ("memory", self.plans.memory_gb.is_empty()),
            ("storage", self.plans.storage_gb.is_empty()),
        ];
        if let Some((field, _)) = empty.iter().find(|(_, is_empty)| *is_empty) {
            return Err(Error::ConfigError(format!(
                "Plan options for {field} must not be empty"
            )));
        }
        Ok(())
    }
}
