//! Host-facing entry points.
//!
//! [`ProvisioningModule`] is the contract a billing host calls once per
//! lifecycle event. Every entry point takes the host's flat parameter map and
//! returns the host's own result shape; none of them can fail or panic back
//! into the host.

use crate::config::{EndpointDefaults, ModuleConfig};
use crate::metadata::ModuleMetadata;
use crate::params::{endpoint_from_params, CUSTOM_ACTION};
use async_trait::async_trait;
use lxd_core::types::{InstanceSpec, LifecycleAction};
use lxd_core::Result;
use lxd_provisioner::{
    ApiResult, CallLogger, ConnectionTestResult, ProvisioningClient, ProvisioningClientBuilder,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Flat parameter map passed by the host.
pub type Params = HashMap<String, String>;

/// Template shown when a client area call fails.
pub const ERROR_TEMPLATE: &str = "error.tpl";
/// Template for the usage page.
pub const MANAGE_TEMPLATE: &str = "templates/manage.tpl";
/// Template for the default overview page.
pub const OVERVIEW_TEMPLATE: &str = "templates/overview.tpl";
/// Template variable carrying the failure reason.
pub const ERROR_VARIABLE: &str = "usefulErrorHelper";

/// Template selection for the client area, rendered by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientAreaView {
    /// Template file to render
    #[serde(rename = "tabOverviewReplacementTemplate")]
    pub template: String,
    /// Variables handed to the template
    #[serde(rename = "templateVariables")]
    pub variables: Map<String, Value>,
}

impl ClientAreaView {
    fn from_result(template: &str, result: &ApiResult) -> Self {
        match result {
            ApiResult::Ok { payload } => {
                let variables = match payload {
                    Some(Value::Object(map)) => map.clone(),
                    Some(Value::Null) | None => Map::new(),
                    Some(other) => {
                        let mut map = Map::new();
                        map.insert("payload".to_string(), other.clone());
                        map
                    }
                };
                Self {
                    template: template.to_string(),
                    variables,
                }
            }
            ApiResult::Failed(failure) => {
                let mut variables = Map::new();
                variables.insert(
                    ERROR_VARIABLE.to_string(),
                    Value::String(failure.reason.clone()),
                );
                Self {
                    template: ERROR_TEMPLATE.to_string(),
                    variables,
                }
            }
        }
    }
}

/// Any value an entry point can hand back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HostResponse {
    /// `"success"` or an error message
    Message(String),
    /// Connection test result
    ConnectionTest(ConnectionTestResult),
    /// Client area template selection
    ClientArea(ClientAreaView),
}

/// Entry points a billing host invokes.
#[async_trait]
pub trait ProvisioningModule: Send + Sync {
    /// Static module description.
    fn metadata(&self) -> ModuleMetadata;

    /// Provision a new container.
    async fn create_account(&self, params: &Params) -> String;

    /// Stop a container.
    async fn suspend_account(&self, params: &Params) -> String;

    /// Start a suspended container.
    async fn unsuspend_account(&self, params: &Params) -> String;

    /// Delete a container.
    async fn terminate_account(&self, params: &Params) -> String;

    /// Reset the service password.
    async fn change_password(&self, params: &Params) -> String;

    /// Resize a container to the plan in `params`.
    async fn change_package(&self, params: &Params) -> String;

    /// Billing renewal.
    async fn renew(&self, params: &Params) -> String;

    /// Check the assigned server.
    async fn test_connection(&self, params: &Params) -> ConnectionTestResult;

    /// Select the client area page; `customAction=manage` shows usage.
    async fn client_area(&self, params: &Params) -> ClientAreaView;

    /// Call an entry point by its function name.
    ///
    /// Unknown names produce an error message rather than a failure.
    async fn invoke(&self, function: &str, params: &Params) -> HostResponse {
        match function {
            "create_account" => HostResponse::Message(self.create_account(params).await),
            "suspend_account" => HostResponse::Message(self.suspend_account(params).await),
            "unsuspend_account" => HostResponse::Message(self.unsuspend_account(params).await),
            "terminate_account" => HostResponse::Message(self.terminate_account(params).await),
            "change_password" => HostResponse::Message(self.change_password(params).await),
            "change_package" => HostResponse::Message(self.change_package(params).await),
            "renew" => HostResponse::Message(self.renew(params).await),
            "test_connection" => HostResponse::ConnectionTest(self.test_connection(params).await),
            "client_area" => HostResponse::ClientArea(self.client_area(params).await),
            other => {
                warn!(function = other, "unknown module function");
                HostResponse::Message(format!("Unknown module function: {other}"))
            }
        }
    }
}

/// [`ProvisioningModule`] backed by a [`ProvisioningClient`].
#[derive(Clone)]
pub struct LxdModule {
    client: ProvisioningClient,
    endpoint: EndpointDefaults,
    metadata: ModuleMetadata,
}

impl LxdModule {
    /// Build the module from its configuration, logging through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns [`lxd_core::Error::ConfigError`] if the configuration is invalid.
    pub fn new(config: ModuleConfig) -> Result<Self> {
        Self::from_builder(config, ProvisioningClient::builder())
    }

    /// Build the module with a host-supplied call logger.
    ///
    /// # Errors
    ///
    /// Returns [`lxd_core::Error::ConfigError`] if the configuration is invalid.
    pub fn with_call_logger(config: ModuleConfig, logger: Arc<dyn CallLogger>) -> Result<Self> {
        Self::from_builder(config, ProvisioningClient::builder().with_call_logger(logger))
    }

    /// Parse a JSON configuration document and build the module.
    ///
    /// # Errors
    ///
    /// Returns [`lxd_core::Error::ConfigError`] if the document is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::new(ModuleConfig::from_json_str(json)?)
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn from_client(client: ProvisioningClient, endpoint: EndpointDefaults) -> Self {
        Self {
            client,
            endpoint,
            metadata: ModuleMetadata::default(),
        }
    }

    fn from_builder(config: ModuleConfig, builder: ProvisioningClientBuilder) -> Result<Self> {
        config.check()?;
        let client = builder
            .with_routes(config.routes)
            .with_plan_options(config.plans)
            .with_client_config(config.client)
            .build()?;
        Ok(Self::from_client(client, config.endpoint))
    }

    /// Access the underlying client.
    #[must_use]
    pub fn client(&self) -> &ProvisioningClient {
        &self.client
    }

    async fn run(&self, function: &str, action: LifecycleAction, params: &Params) -> ApiResult {
        if !action.is_remote() {
            debug!(function, %action, "no remote call required");
            return ApiResult::ok();
        }

        let prepared = endpoint_from_params(params, &self.endpoint)
            .and_then(|endpoint| InstanceSpec::from_params(params).map(|spec| (endpoint, spec)));

        match prepared {
            Ok((endpoint, spec)) => {
                self.client
                    .execute_with_params(function, &endpoint, action, &spec, params)
                    .await
            }
            Err(err) => self.client.reject(function, params, &err),
        }
    }

    async fn lifecycle(&self, function: &str, action: LifecycleAction, params: &Params) -> String {
        self.run(function, action, params).await.to_host_string()
    }
}

#[async_trait]
impl ProvisioningModule for LxdModule {
    fn metadata(&self) -> ModuleMetadata {
        self.metadata.clone()
    }

    async fn create_account(&self, params: &Params) -> String {
        self.lifecycle("create_account", LifecycleAction::Create, params)
            .await
    }

    async fn suspend_account(&self, params: &Params) -> String {
        self.lifecycle("suspend_account", LifecycleAction::Suspend, params)
            .await
    }

    async fn unsuspend_account(&self, params: &Params) -> String {
        self.lifecycle("unsuspend_account", LifecycleAction::Unsuspend, params)
            .await
    }

    async fn terminate_account(&self, params: &Params) -> String {
        self.lifecycle("terminate_account", LifecycleAction::Terminate, params)
            .await
    }

    async fn change_password(&self, params: &Params) -> String {
        self.lifecycle("change_password", LifecycleAction::ChangePassword, params)
            .await
    }

    async fn change_package(&self, params: &Params) -> String {
        self.lifecycle("change_package", LifecycleAction::ChangePlan, params)
            .await
    }

    async fn renew(&self, params: &Params) -> String {
        self.lifecycle("renew", LifecycleAction::Renew, params)
            .await
    }

    async fn test_connection(&self, params: &Params) -> ConnectionTestResult {
        let result = match endpoint_from_params(params, &self.endpoint) {
            Ok(endpoint) => {
                self.client
                    .execute_with_params(
                        "test_connection",
                        &endpoint,
                        LifecycleAction::TestConnection,
                        &InstanceSpec::new(),
                        params,
                    )
                    .await
            }
            Err(err) => self.client.reject("test_connection", params, &err),
        };
        ConnectionTestResult::from(&result)
    }

    async fn client_area(&self, params: &Params) -> ClientAreaView {
        let (action, template) = match params.get(CUSTOM_ACTION).map(String::as_str) {
            Some("manage") => (LifecycleAction::GetUsage, MANAGE_TEMPLATE),
            _ => (LifecycleAction::GetStats, OVERVIEW_TEMPLATE),
        };
        let result = self.run("client_area", action, params).await;
        ClientAreaView::from_result(template, &result)
    }
}

impl std::fmt::Debug for LxdModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LxdModule")
            .field("endpoint", &self.endpoint)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
