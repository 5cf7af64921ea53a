//! Billing host adapter for LXD container provisioning.
//!
//! Exposes the per-event entry points a billing host calls
//! (`create_account`, `suspend_account`, `test_connection`, ...) on top of
//! [`lxd_provisioner::ProvisioningClient`]. The host's flat parameter map is
//! split into the server endpoint ([`params`]) and the instance
//! specification; results come back in the host's own shapes.

#![deny(missing_docs)]

pub mod config;
pub mod metadata;
pub mod module;
pub mod params;

pub use config::{EndpointDefaults, ModuleConfig};
pub use metadata::ModuleMetadata;
pub use module::{ClientAreaView, HostResponse, LxdModule, Params, ProvisioningModule};
pub use params::endpoint_from_params;

/// Convenient result alias matching the shared provisioning error type.
pub type Result<T> = lxd_core::Result<T>;
