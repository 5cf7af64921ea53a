//! # lxd-core
//!
//! Core types and configuration for provisioning LXD containers from a
//! billing system.
//!
//! ## Modules
//!
//! - [`error`] - Error type and failure classification
//! - [`types`] - Lifecycle actions, instance specifications and plan options
//! - [`config`] - Server endpoint and credential configuration
//! - [`client`] - HTTP client timeouts and connection pooling

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{Credential, ServerEndpoint};
pub use error::{Error, FailureKind, Result};
pub use types::{InstanceSpec, LifecycleAction, PlanOptions};
