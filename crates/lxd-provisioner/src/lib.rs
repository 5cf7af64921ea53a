//! Provisioning client for LXD container platforms.
//!
//! Lifecycle actions flow through three layers: the [`ActionResolver`] turns
//! an action and an [`InstanceSpec`](lxd_core::InstanceSpec) into a
//! [`RemoteRequest`], the [`Transport`] sends it exactly once, and
//! [`translate`] converts the outcome into the host-facing [`ApiResult`].
//! [`ProvisioningClient`] ties the layers together.

#![deny(missing_docs)]

pub mod call_log;
pub mod client;
pub mod models;
pub mod resolver;
pub mod routes;
pub mod transport;
pub mod translate;

pub use call_log::{CallLogRecord, CallLogger, MemoryCallLogger, TracingCallLogger};
pub use client::{ProvisioningClient, ProvisioningClientBuilder};
pub use models::{HttpMethod, RemotePayload, RemoteRequest, Resolution, ResponseShape, TransportOutcome};
pub use resolver::{ActionResolver, RequestBuilder};
pub use routes::{RouteTable, RouteTemplate};
pub use transport::{HttpTransport, Transport};
pub use translate::{translate, ApiResult, ConnectionTestResult, Failure};

/// Convenient result alias matching the shared provisioning error type.
pub type Result<T> = lxd_core::Result<T>;
