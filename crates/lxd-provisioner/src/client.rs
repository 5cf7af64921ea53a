//! Provisioning client: one call per lifecycle event.
//!
//! The client runs resolve, send and translate, and reports every failure to
//! the configured [`CallLogger`]. It never returns an error or panics past its
//! public methods; every invocation yields exactly one [`ApiResult`].

use crate::call_log::{CallLogRecord, CallLogger, TracingCallLogger};
use crate::models::Resolution;
use crate::resolver::{ActionResolver, RequestBuilder};
use crate::routes::RouteTable;
use crate::transport::{HttpTransport, Transport};
use crate::translate::{failure, translate, ApiResult, ConnectionTestResult};
use lxd_core::client::ClientConfig;
use lxd_core::config::ServerEndpoint;
use lxd_core::types::{redact_params, InstanceSpec, LifecycleAction, PlanOptions, MODULE_NAME};
use lxd_core::Error;
use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for [`ProvisioningClient`].
#[derive(Default)]
pub struct ProvisioningClientBuilder {
    routes: Option<RouteTable>,
    builder: Option<Arc<dyn RequestBuilder>>,
    plans: Option<PlanOptions>,
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    logger: Option<Arc<dyn CallLogger>>,
    module: Option<String>,
}

impl ProvisioningClientBuilder {
    /// Create a builder with default settings and no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a route table to build requests. The table is validated by
    /// [`build`](Self::build).
    #[must_use]
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Some(routes);
        self.builder = None;
        self
    }

    /// Use a custom request builder.
    #[must_use]
    pub fn with_request_builder(mut self, builder: Arc<dyn RequestBuilder>) -> Self {
        self.builder = Some(builder);
        self.routes = None;
        self
    }

    /// Override the published plan options.
    #[must_use]
    pub fn with_plan_options(mut self, plans: PlanOptions) -> Self {
        self.plans = Some(plans);
        self
    }

    /// Set the HTTP client configuration used by the default transport.
    #[must_use]
    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom transport instead of [`HttpTransport`].
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the call logger. Defaults to [`TracingCallLogger`].
    #[must_use]
    pub fn with_call_logger(mut self, logger: Arc<dyn CallLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the module name written into call log records.
    #[must_use]
    pub fn with_module_name(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if no routes were supplied, the route
    /// table is invalid, or the client configuration is out of range.
    pub fn build(self) -> crate::Result<ProvisioningClient> {
        let builder: Arc<dyn RequestBuilder> = match (self.routes, self.builder) {
            (Some(routes), _) => {
                routes.validate()?;
                Arc::new(routes)
            }
            (None, Some(builder)) => builder,
            (None, None) => {
                return Err(Error::ConfigError("No routes configured".to_string()));
            }
        };

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config)?),
        };

        let mut resolver = ActionResolver::new(builder);
        if let Some(plans) = self.plans {
            resolver = resolver.with_plan_options(plans);
        }

        Ok(ProvisioningClient {
            resolver,
            transport,
            logger: self
                .logger
                .unwrap_or_else(|| Arc::new(TracingCallLogger)),
            module: self.module.unwrap_or_else(|| MODULE_NAME.to_string()),
        })
    }
}

/// Maps lifecycle actions onto the container platform API.
#[derive(Clone)]
pub struct ProvisioningClient {
    resolver: ActionResolver,
    transport: Arc<dyn Transport>,
    logger: Arc<dyn CallLogger>,
    module: String,
}

impl ProvisioningClient {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> ProvisioningClientBuilder {
        ProvisioningClientBuilder::new()
    }

    /// Access the resolver.
    #[must_use]
    pub fn resolver(&self) -> &ActionResolver {
        &self.resolver
    }

    /// Perform an action, logging failures under the action's own name.
    pub async fn execute(
        &self,
        endpoint: &ServerEndpoint,
        action: LifecycleAction,
        spec: &InstanceSpec,
    ) -> ApiResult {
        self.execute_labeled(action.name(), endpoint, action, spec)
            .await
    }

    /// Perform an action, logging failures under `label`.
    ///
    /// Hosts that name their entry points differently from the actions
    /// (`suspend_account` for `suspend`) pass their own name here. Failures
    /// record the redacted instance fields.
    pub async fn execute_labeled(
        &self,
        label: &str,
        endpoint: &ServerEndpoint,
        action: LifecycleAction,
        spec: &InstanceSpec,
    ) -> ApiResult {
        self.perform(label, endpoint, action, spec, None).await
    }

    /// Perform an action on behalf of a host call with raw parameters.
    ///
    /// Like [`execute_labeled`](Self::execute_labeled), but failures record
    /// the redacted raw parameters, server keys included.
    pub async fn execute_with_params(
        &self,
        label: &str,
        endpoint: &ServerEndpoint,
        action: LifecycleAction,
        spec: &InstanceSpec,
        params: &HashMap<String, String>,
    ) -> ApiResult {
        self.perform(label, endpoint, action, spec, Some(params))
            .await
    }

    async fn perform(
        &self,
        label: &str,
        endpoint: &ServerEndpoint,
        action: LifecycleAction,
        spec: &InstanceSpec,
        params: Option<&HashMap<String, String>>,
    ) -> ApiResult {
        let outcome = match self.resolver.resolve(action, spec) {
            Ok(Resolution::NoOp) => {
                debug!(%action, "no remote call required");
                return ApiResult::ok();
            }
            Ok(Resolution::Remote(request)) => self.transport.send(endpoint, &request).await,
            Err(err) => Err(err),
        };

        match outcome {
            Err(err) => {
                let failure = failure(label, &err);
                let input = params.map_or_else(|| spec.redacted_snapshot(), redact_params);
                self.record(label, input, &failure.reason, &failure.detail);
                ApiResult::Failed(failure)
            }
            success => {
                info!(%action, endpoint = %endpoint.host, "action completed");
                translate(action, success)
            }
        }
    }

    /// Perform an action named by a host verb with a raw parameter map.
    ///
    /// Unknown verbs and malformed parameters fail as invalid input without
    /// reaching the remote API.
    pub async fn dispatch(
        &self,
        endpoint: &ServerEndpoint,
        action: &str,
        params: &HashMap<String, String>,
    ) -> ApiResult {
        let parsed = action
            .parse::<LifecycleAction>()
            .and_then(|parsed| InstanceSpec::from_params(params).map(|spec| (parsed, spec)));

        match parsed {
            Ok((parsed, spec)) => {
                self.execute_with_params(action, endpoint, parsed, &spec, params)
                    .await
            }
            Err(err) => self.reject(action, params, &err),
        }
    }

    /// Fail an invocation that could not be prepared, logging it under
    /// `label` with the redacted raw parameters.
    ///
    /// Hosts use this when they fail to build the endpoint or spec before an
    /// action can be executed.
    #[must_use]
    pub fn reject(&self, label: &str, params: &HashMap<String, String>, err: &Error) -> ApiResult {
        let failure = failure(label, err);
        self.record(label, redact_params(params), &failure.reason, &failure.detail);
        ApiResult::Failed(failure)
    }

    /// Provision a new container.
    pub async fn create(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::Create, spec).await
    }

    /// Stop a container.
    pub async fn suspend(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::Suspend, spec).await
    }

    /// Start a suspended container.
    pub async fn unsuspend(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::Unsuspend, spec)
            .await
    }

    /// Delete a container.
    pub async fn terminate(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::Terminate, spec)
            .await
    }

    /// Resize a container.
    pub async fn change_plan(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::ChangePlan, spec)
            .await
    }

    /// Reset the service password.
    pub async fn change_password(
        &self,
        endpoint: &ServerEndpoint,
        spec: &InstanceSpec,
    ) -> ApiResult {
        self.execute(endpoint, LifecycleAction::ChangePassword, spec)
            .await
    }

    /// Renewal; always succeeds without contacting the remote API.
    pub async fn renew(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::Renew, spec).await
    }

    /// Check that the endpoint is reachable and accepts the credential.
    pub async fn test_connection(&self, endpoint: &ServerEndpoint) -> ConnectionTestResult {
        let result = self
            .execute(endpoint, LifecycleAction::TestConnection, &InstanceSpec::new())
            .await;
        ConnectionTestResult::from(&result)
    }

    /// Fetch resource usage for a container.
    pub async fn get_usage(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::GetUsage, spec)
            .await
    }

    /// Fetch runtime statistics for a container.
    pub async fn get_stats(&self, endpoint: &ServerEndpoint, spec: &InstanceSpec) -> ApiResult {
        self.execute(endpoint, LifecycleAction::GetStats, spec)
            .await
    }

    fn record(&self, action: &str, input: BTreeMap<String, String>, reason: &str, detail: &str) {
        let record = CallLogRecord::new(self.module.as_str(), action, input, reason, detail);
        if catch_unwind(AssertUnwindSafe(|| self.logger.log_call(&record))).is_err() {
            debug!(action, "call logger panicked; record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_log::MemoryCallLogger;
    use crate::models::RemotePayload;
    use crate::routes::tests::sample_table;
    use crate::transport::MockTransport;
    use lxd_core::types::REDACTED;
    use lxd_core::FailureKind;

    fn endpoint() -> ServerEndpoint {
        ServerEndpoint::new("lxd.example.com", true).unwrap()
    }

    fn client(transport: MockTransport, logger: Arc<MemoryCallLogger>) -> ProvisioningClient {
        ProvisioningClient::builder()
            .with_routes(sample_table())
            .with_transport(Arc::new(transport))
            .with_call_logger(logger)
            .build()
            .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_build_requires_routes() {
        let err = ProvisioningClient::builder().build().err().unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn test_build_validates_routes() {
        let mut routes = sample_table();
        routes.terminate.path = "/containers/{nmae}".to_string();
        let err = ProvisioningClient::builder()
            .with_routes(routes)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_renew_never_reaches_transport() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let logger = Arc::new(MemoryCallLogger::new());

        let result = client(transport, logger.clone())
            .renew(&endpoint(), &InstanceSpec::new())
            .await;
        assert_eq!(result.to_host_string(), "success");
        assert!(logger.records().is_empty());
    }

    #[tokio::test]
    async fn test_missing_hostname_never_reaches_transport() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let logger = Arc::new(MemoryCallLogger::new());

        let result = client(transport, logger.clone())
            .dispatch(
                &endpoint(),
                "create",
                &params(&[("cores", "2"), ("memory", "4"), ("storage", "40")]),
            )
            .await;

        assert_eq!(
            result.to_host_string(),
            "hostname is required for the create action"
        );
        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "create");
        assert!(records[0].trace.starts_with("[INVALID_INPUT]"));
    }

    #[tokio::test]
    async fn test_unknown_verb_is_invalid_input() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();
        let logger = Arc::new(MemoryCallLogger::new());

        let result = client(transport, logger.clone())
            .dispatch(
                &endpoint(),
                "reboot",
                &params(&[("hostname", "cloud1"), ("serverpassword", "hunter2")]),
            )
            .await;

        assert_eq!(result.failure().unwrap().kind, FailureKind::InvalidInput);
        let records = logger.records();
        assert_eq!(records[0].action, "reboot");
        assert_eq!(records[0].input["serverpassword"], REDACTED);
    }

    #[tokio::test]
    async fn test_create_success() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|_, request| {
                request.action == LifecycleAction::Create && request.path == "containers"
            })
            .times(1)
            .returning(|_, _| {
                Ok(RemotePayload {
                    status: 201,
                    body: None,
                })
            });
        let logger = Arc::new(MemoryCallLogger::new());

        let spec = InstanceSpec::new().with_name("cloud1").with_plan(2, 4, 40);
        let result = client(transport, logger.clone())
            .create(&endpoint(), &spec)
            .await;
        assert_eq!(result.to_host_string(), "success");
        assert!(logger.records().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_suspend_classifies_identically() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(2).returning(|_, _| {
            Err(Error::RemoteRejected {
                status: 400,
                code: None,
                message: "The instance is already stopped".to_string(),
            })
        });
        let logger = Arc::new(MemoryCallLogger::new());
        let client = client(transport, logger.clone());
        let spec = InstanceSpec::new().with_name("cloud1");

        let first = client.suspend(&endpoint(), &spec).await;
        let second = client.suspend(&endpoint(), &spec).await;

        assert_eq!(first.failure().unwrap().kind, FailureKind::RemoteRejected);
        assert_eq!(first, second);
        assert_eq!(logger.records().len(), 2);
    }

    #[tokio::test]
    async fn test_connection_test_with_bad_credentials() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_, _| Err(Error::AuthError("401 Unauthorized".to_string())));
        let logger = Arc::new(MemoryCallLogger::new());

        let result = client(transport, logger.clone())
            .test_connection(&endpoint())
            .await;
        assert!(!result.success);
        assert!(!result.error.is_empty());
        assert_eq!(logger.records()[0].action, "conn_test");
    }

    #[tokio::test]
    async fn test_labeled_execution_logs_label_and_redacts() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_, _| Err(Error::Timeout("operation timed out".to_string())));
        let logger = Arc::new(MemoryCallLogger::new());

        let spec = InstanceSpec::new()
            .with_name("cloud1")
            .with_password("hunter2");
        let result = client(transport, logger.clone())
            .execute_labeled(
                "change_password",
                &endpoint(),
                LifecycleAction::ChangePassword,
                &spec,
            )
            .await;

        assert!(result.failure().unwrap().retryable);
        let record = &logger.records()[0];
        assert_eq!(record.action, "change_password");
        assert_eq!(record.input["password"], REDACTED);
        assert!(!record.trace.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_host_call_logs_raw_params_under_label() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_, _| {
            Err(Error::RemoteRejected {
                status: 500,
                code: None,
                message: "storage pool busy".to_string(),
            })
        });
        let logger = Arc::new(MemoryCallLogger::new());

        let params = params(&[
            ("hostname", "cloud1"),
            ("serverip", "10.0.0.5"),
            ("serveraccesshash", "trusted-token"),
        ]);
        let spec = InstanceSpec::from_params(&params).unwrap();
        let result = client(transport, logger.clone())
            .execute_with_params(
                "terminate_account",
                &endpoint(),
                LifecycleAction::Terminate,
                &spec,
                &params,
            )
            .await;

        assert!(result.failure().unwrap().retryable);
        let record = &logger.records()[0];
        assert_eq!(record.action, "terminate_account");
        assert!(record.trace.starts_with("[REMOTE_REJECTED] action=terminate_account"));
        assert_eq!(record.input["serverip"], "10.0.0.5");
        assert_eq!(record.input["serveraccesshash"], REDACTED);
    }

    struct PanickingLogger;

    impl CallLogger for PanickingLogger {
        fn log_call(&self, _record: &CallLogRecord) {
            panic!("sink unavailable");
        }
    }

    #[tokio::test]
    async fn test_panicking_logger_does_not_escape() {
        let mut transport = MockTransport::new();
        transport.expect_send().never();

        let client = ProvisioningClient::builder()
            .with_routes(sample_table())
            .with_transport(Arc::new(transport))
            .with_call_logger(Arc::new(PanickingLogger))
            .build()
            .unwrap();

        let result = client
            .suspend(&endpoint(), &InstanceSpec::new())
            .await;
        assert_eq!(result.failure().unwrap().kind, FailureKind::InvalidInput);
    }
}
