//! Module metadata reported to the billing host.

use lxd_core::types::{DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use serde::Serialize;

/// Module API version understood by the host.
pub const MODULE_API_VERSION: &str = "1.1";

/// Name shown in the host's server module list.
pub const DISPLAY_NAME: &str = "LXD Provisioning Module";

/// Static description of the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleMetadata {
    /// Display name
    #[serde(rename = "DisplayName")]
    pub display_name: String,
    /// Module API version
    #[serde(rename = "APIVersion")]
    pub api_version: String,
    /// Whether a server must be assigned to products using this module
    #[serde(rename = "RequiresServer")]
    pub requires_server: bool,
    /// Default port for plain HTTP
    #[serde(rename = "DefaultNonSSLPort", serialize_with = "port_as_string")]
    pub default_http_port: u16,
    /// Default port for HTTPS
    #[serde(rename = "DefaultSSLPort", serialize_with = "port_as_string")]
    pub default_https_port: u16,
}

// The host reads ports as strings.
fn port_as_string<S: serde::Serializer>(port: &u16, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(port)
}

impl Default for ModuleMetadata {
    fn default() -> Self {
        Self {
            display_name: DISPLAY_NAME.to_string(),
            api_version: MODULE_API_VERSION.to_string(),
            requires_server: true,
            default_http_port: DEFAULT_HTTP_PORT,
            default_https_port: DEFAULT_HTTPS_PORT,
        }
    }
}
