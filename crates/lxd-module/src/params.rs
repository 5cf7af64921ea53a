//! Server parameters supplied by the billing host.
//!
//! The host passes the assigned server as flat `server*` keys next to the
//! product parameters. This module turns them into a [`ServerEndpoint`].

use crate::config::EndpointDefaults;
use lxd_core::config::{Credential, ServerEndpoint};
use lxd_core::{Error, Result};
use std::collections::HashMap;

/// Server parameter keys used by the host.
pub mod server_keys {
    /// Server hostname
    pub const HOSTNAME: &str = "serverhostname";
    /// Server IP address, used when no hostname is set
    pub const IP: &str = "serverip";
    /// Port override
    pub const PORT: &str = "serverport";
    /// Whether to use HTTPS
    pub const SECURE: &str = "serversecure";
    /// Username for basic authentication
    pub const USERNAME: &str = "serverusername";
    /// Password for basic authentication
    pub const PASSWORD: &str = "serverpassword";
    /// Access hash: an API token or a PEM client identity
    pub const ACCESS_HASH: &str = "serveraccesshash";
}

/// Key the host uses for the client area sub-page selection.
pub const CUSTOM_ACTION: &str = "customAction";

const PEM_MARKER: &str = "-----BEGIN";

fn value<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "on" | "1" | "true" | "yes"
    )
}

/// Build the endpoint for a call from the host's server parameters.
///
/// The access hash wins over username and password: a PEM bundle becomes a
/// client certificate, anything else a header token shaped by `defaults`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if no server address is given or the port
/// is not a valid port number.
pub fn endpoint_from_params(
    params: &HashMap<String, String>,
    defaults: &EndpointDefaults,
) -> Result<ServerEndpoint> {
    let host = value(params, server_keys::HOSTNAME)
        .or_else(|| value(params, server_keys::IP))
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} or {} is required",
                server_keys::HOSTNAME,
                server_keys::IP
            ))
        })?;
    let secure = value(params, server_keys::SECURE).is_some_and(is_truthy);

    let mut endpoint = ServerEndpoint::new(host, secure)?
        .with_tls_verify(defaults.tls_verify)
        .with_path_prefix(defaults.path_prefix.clone());

    if let Some(raw) = value(params, server_keys::PORT) {
        let port = raw.parse::<u16>().ok().filter(|port| *port != 0).ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} must be a port number, got `{raw}`",
                server_keys::PORT
            ))
        })?;
        endpoint = endpoint.with_port(port);
    }

    Ok(endpoint.with_credential(credential_from_params(params, defaults)))
}

fn credential_from_params(
    params: &HashMap<String, String>,
    defaults: &EndpointDefaults,
) -> Credential {
    if let Some(hash) = value(params, server_keys::ACCESS_HASH) {
        if hash.contains(PEM_MARKER) {
            return Credential::ClientCertificate {
                identity_pem: hash.to_string().into(),
            };
        }
        return Credential::Token {
            header: defaults.token_header.clone(),
            scheme: defaults.token_scheme.clone(),
            token: hash.to_string().into(),
        };
    }

    match (
        value(params, server_keys::USERNAME),
        value(params, server_keys::PASSWORD),
    ) {
        (Some(username), Some(password)) => Credential::basic(username, password),
        _ => Credential::None,
    }
}
