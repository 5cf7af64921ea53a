//! Core provisioning domain types.
//!
//! This module provides the closed set of lifecycle actions, the validated
//! instance description built from the host's parameter bag, and the
//! published plan option sets.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Name under which the module reports itself to the host and its call log.
pub const MODULE_NAME: &str = "lxd";
/// Default port for plain HTTP endpoints
pub const DEFAULT_HTTP_PORT: u16 = 1111;
/// Default port for TLS endpoints
pub const DEFAULT_HTTPS_PORT: u16 = 1112;

/// Longest container name accepted (a single DNS label).
pub const MAX_NAME_LEN: usize = 63;

/// Parameter keys understood when building an [`InstanceSpec`].
pub mod param_keys {
    /// Container hostname
    pub const HOSTNAME: &str = "hostname";
    /// CPU core count
    pub const CORES: &str = "cores";
    /// Memory in GB
    pub const MEMORY: &str = "memory";
    /// Storage in GB
    pub const STORAGE: &str = "storage";
    /// Service username
    pub const USERNAME: &str = "username";
    /// New service password
    pub const PASSWORD: &str = "password";

    /// Positional product option carrying the hostname
    pub const OPTION_HOSTNAME: &str = "configoption1";
    /// Positional product option carrying the core count
    pub const OPTION_CORES: &str = "configoption2";
    /// Positional product option carrying the memory size
    pub const OPTION_MEMORY: &str = "configoption3";
    /// Positional product option carrying the storage size
    pub const OPTION_STORAGE: &str = "configoption4";

    /// Prefix of keys describing the server endpoint rather than the instance
    pub const SERVER_PREFIX: &str = "server";
}

/// Lifecycle actions a billing host can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Provision a new container
    Create,
    /// Stop a container without deleting it
    Suspend,
    /// Restart a suspended container
    Unsuspend,
    /// Delete a container
    Terminate,
    /// Resize a container to a different plan
    ChangePlan,
    /// Reset the service password
    ChangePassword,
    /// Billing cycle renewal (no remote effect)
    Renew,
    /// Verify that the endpoint and credential work
    TestConnection,
    /// Fetch resource usage for a container
    GetUsage,
    /// Fetch runtime statistics for a container
    GetStats,
}

impl LifecycleAction {
    /// Returns the verb used by the host for this action.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Suspend => "suspend",
            Self::Unsuspend => "unsuspend",
            Self::Terminate => "terminate",
            Self::ChangePlan => "change",
            Self::ChangePassword => "password",
            Self::Renew => "renew",
            Self::TestConnection => "conn_test",
            Self::GetUsage => "get_usage",
            Self::GetStats => "get_stats",
        }
    }

    /// Returns all lifecycle actions.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Create,
            Self::Suspend,
            Self::Unsuspend,
            Self::Terminate,
            Self::ChangePlan,
            Self::ChangePassword,
            Self::Renew,
            Self::TestConnection,
            Self::GetUsage,
            Self::GetStats,
        ]
    }

    /// Returns true if the action needs a call to the remote API.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        !matches!(self, Self::Renew)
    }

    /// Returns the instance fields the action cannot do without.
    #[must_use]
    pub const fn required_fields(&self) -> &'static [InstanceField] {
        match self {
            Self::Create | Self::ChangePlan => &[
                InstanceField::Name,
                InstanceField::Cores,
                InstanceField::Memory,
                InstanceField::Storage,
            ],
            Self::Suspend | Self::Unsuspend | Self::Terminate | Self::GetUsage | Self::GetStats => {
                &[InstanceField::Name]
            }
            Self::ChangePassword => &[InstanceField::Name, InstanceField::Password],
            Self::Renew | Self::TestConnection => &[],
        }
    }
}

impl FromStr for LifecycleAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "suspend" => Ok(Self::Suspend),
            "unsuspend" => Ok(Self::Unsuspend),
            "terminate" => Ok(Self::Terminate),
            "change" | "change_plan" => Ok(Self::ChangePlan),
            "password" | "change_password" => Ok(Self::ChangePassword),
            "renew" => Ok(Self::Renew),
            "conn_test" | "test_connection" => Ok(Self::TestConnection),
            "get_usage" => Ok(Self::GetUsage),
            "get_stats" => Ok(Self::GetStats),
            _ => Err(Error::InvalidInput(format!("Unknown lifecycle action: {s}"))),
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Fields of an [`InstanceSpec`] that actions may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceField {
    /// Container name
    Name,
    /// CPU cores
    Cores,
    /// Memory size
    Memory,
    /// Storage size
    Storage,
    /// Service username
    Username,
    /// New password
    Password,
}

impl InstanceField {
    /// Returns the parameter key that supplies the field.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Name => param_keys::HOSTNAME,
            Self::Cores => param_keys::CORES,
            Self::Memory => param_keys::MEMORY,
            Self::Storage => param_keys::STORAGE,
            Self::Username => param_keys::USERNAME,
            Self::Password => param_keys::PASSWORD,
        }
    }
}

/// Description of one container, supplied by the host per call.
#[derive(Debug, Clone, Default)]
pub struct InstanceSpec {
    /// Container name (also its hostname)
    pub name: Option<String>,
    /// CPU core count
    pub cores: Option<u32>,
    /// Memory in GB
    pub memory_gb: Option<u32>,
    /// Storage in GB
    pub storage_gb: Option<u32>,
    /// Service username
    pub username: Option<String>,
    /// New service password
    pub password: Option<SecretString>,
    /// Action specific fields passed through to request templates
    pub extra: BTreeMap<String, String>,
}

impl InstanceSpec {
    /// Create an empty specification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a specification from the host's flat parameter map.
    ///
    /// Named keys win over the positional `configoptionN` keys. Empty values
    /// count as absent. Keys starting with `server` describe the endpoint and
    /// are never copied into [`InstanceSpec::extra`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a size is not a whole number.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self> {
        let lookup = |primary: &str, fallback: Option<&str>| -> Option<String> {
            let value = |key: &str| {
                params
                    .get(key)
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            value(primary).or_else(|| fallback.and_then(value))
        };

        let cores = parse_size(
            param_keys::CORES,
            lookup(param_keys::CORES, Some(param_keys::OPTION_CORES)),
        )?;
        let memory_gb = parse_size(
            param_keys::MEMORY,
            lookup(param_keys::MEMORY, Some(param_keys::OPTION_MEMORY)),
        )?;
        let storage_gb = parse_size(
            param_keys::STORAGE,
            lookup(param_keys::STORAGE, Some(param_keys::OPTION_STORAGE)),
        )?;

        const CONSUMED: &[&str] = &[
            param_keys::HOSTNAME,
            param_keys::CORES,
            param_keys::MEMORY,
            param_keys::STORAGE,
            param_keys::USERNAME,
            param_keys::PASSWORD,
            param_keys::OPTION_HOSTNAME,
            param_keys::OPTION_CORES,
            param_keys::OPTION_MEMORY,
            param_keys::OPTION_STORAGE,
        ];

        let extra = params
            .iter()
            .filter(|(key, _)| {
                !CONSUMED.contains(&key.as_str()) && !key.starts_with(param_keys::SERVER_PREFIX)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            name: lookup(param_keys::HOSTNAME, Some(param_keys::OPTION_HOSTNAME)),
            cores,
            memory_gb,
            storage_gb,
            username: lookup(param_keys::USERNAME, None),
            password: lookup(param_keys::PASSWORD, None).map(SecretString::from),
            extra,
        })
    }

    /// Set the container name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the plan sizes.
    #[must_use]
    pub const fn with_plan(mut self, cores: u32, memory_gb: u32, storage_gb: u32) -> Self {
        self.cores = Some(cores);
        self.memory_gb = Some(memory_gb);
        self.storage_gb = Some(storage_gb);
        self
    }

    /// Set the service username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the new password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Add an action specific field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns true if the field carries a value.
    #[must_use]
    pub fn has(&self, field: InstanceField) -> bool {
        match field {
            InstanceField::Name => self.name.is_some(),
            InstanceField::Cores => self.cores.is_some(),
            InstanceField::Memory => self.memory_gb.is_some(),
            InstanceField::Storage => self.storage_gb.is_some(),
            InstanceField::Username => self.username.is_some(),
            InstanceField::Password => self.password.is_some(),
        }
    }

    /// Snapshot of the specification with secrets masked, for call logs.
    #[must_use]
    pub fn redacted_snapshot(&self) -> BTreeMap<String, String> {
        let mut snapshot = BTreeMap::new();
        if let Some(name) = &self.name {
            snapshot.insert(param_keys::HOSTNAME.to_string(), name.clone());
        }
        if let Some(cores) = self.cores {
            snapshot.insert(param_keys::CORES.to_string(), cores.to_string());
        }
        if let Some(memory) = self.memory_gb {
            snapshot.insert(param_keys::MEMORY.to_string(), memory.to_string());
        }
        if let Some(storage) = self.storage_gb {
            snapshot.insert(param_keys::STORAGE.to_string(), storage.to_string());
        }
        if let Some(username) = &self.username {
            snapshot.insert(param_keys::USERNAME.to_string(), username.clone());
        }
        if self.password.is_some() {
            snapshot.insert(param_keys::PASSWORD.to_string(), REDACTED.to_string());
        }
        for (key, value) in &self.extra {
            let value = if is_sensitive_key(key) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            snapshot.insert(key.clone(), value);
        }
        snapshot
    }
}

/// Placeholder written instead of secret values.
pub const REDACTED: &str = "********";

/// Returns true for parameter keys whose values must never be logged.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    ["password", "secret", "token", "accesshash", "key"]
        .iter()
        .any(|needle| key.contains(needle))
}

/// Copy of a raw parameter map with sensitive values masked.
#[must_use]
pub fn redact_params(params: &HashMap<String, String>) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(key, value)| {
            let value = if is_sensitive_key(key) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

fn parse_size(key: &str, value: Option<String>) -> Result<Option<u32>> {
    value
        .map(|raw| {
            raw.parse::<u32>().map_err(|_| {
                Error::InvalidInput(format!("{key} must be a whole number, got `{raw}`"))
            })
        })
        .transpose()
}

/// Validate a container name.
///
/// Names are single DNS labels: 1 to 63 ASCII letters, digits or dashes,
/// starting with a letter and not ending with a dash.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] describing the first violated rule.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "hostname must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(Error::InvalidInput(format!(
            "hostname `{name}` may only contain letters, digits and dashes"
        )));
    }
    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(Error::InvalidInput(format!(
            "hostname `{name}` must start with a letter"
        )));
    }
    if name.ends_with('-') {
        return Err(Error::InvalidInput(format!(
            "hostname `{name}` must not end with a dash"
        )));
    }
    Ok(())
}

/// Published plan sizes a container may be provisioned with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Accepted CPU core counts
    #[serde(default = "default_cores")]
    pub cores: Vec<u32>,
    /// Accepted memory sizes in GB
    #[serde(default = "default_memory_gb")]
    pub memory_gb: Vec<u32>,
    /// Accepted storage sizes in GB
    #[serde(default = "default_storage_gb")]
    pub storage_gb: Vec<u32>,
}

fn default_cores() -> Vec<u32> {
    vec![1, 2, 4, 8, 16]
}

fn default_memory_gb() -> Vec<u32> {
    vec![1, 2, 3, 4, 8]
}

fn default_storage_gb() -> Vec<u32> {
    vec![10, 20, 30, 40, 80]
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            memory_gb: default_memory_gb(),
            storage_gb: default_storage_gb(),
        }
    }
}

impl PlanOptions {
    /// Check a full plan against the published sets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first value outside its set.
    pub fn check(&self, cores: u32, memory_gb: u32, storage_gb: u32) -> Result<()> {
        self.check_partial(Some(cores), Some(memory_gb), Some(storage_gb))
    }

    /// Check whichever sizes are present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first value outside its set.
    pub fn check_partial(
        &self,
        cores: Option<u32>,
        memory_gb: Option<u32>,
        storage_gb: Option<u32>,
    ) -> Result<()> {
        if let Some(cores) = cores {
            check_member("cores", cores, &self.cores)?;
        }
        if let Some(memory) = memory_gb {
            check_member("memory", memory, &self.memory_gb)?;
        }
        if let Some(storage) = storage_gb {
            check_member("storage", storage, &self.storage_gb)?;
        }
        Ok(())
    }
}

fn check_member(field: &str, value: u32, allowed: &[u32]) -> Result<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    let allowed = allowed
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(Error::InvalidInput(format!(
        "{field} value {value} is not one of the offered options ({allowed})"
    )))
}
