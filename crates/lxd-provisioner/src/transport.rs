//! HTTP transport for the container platform API.
//!
//! Sends exactly one attempt per request and classifies the outcome. Retry
//! policy, if any, belongs to the caller.

use crate::models::{RemoteErrorBody, RemotePayload, RemoteRequest, ResponseShape, TransportOutcome};
use async_trait::async_trait;
use lxd_core::client::ClientConfig;
use lxd_core::config::{Credential, ServerEndpoint};
use lxd_core::Error;
use reqwest::{Client, ClientBuilder, StatusCode};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

const USER_AGENT: &str = concat!("lxd-provisioner/", env!("CARGO_PKG_VERSION"));

/// Sends a resolved request to an endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt and classify the outcome.
    async fn send(&self, endpoint: &ServerEndpoint, request: &RemoteRequest) -> TransportOutcome;
}

/// [`Transport`] backed by `reqwest`, pooling one client per endpoint.
pub struct HttpTransport {
    config: ClientConfig,
    pool: RwLock<HashMap<String, Client>>,
}

impl HttpTransport {
    /// Create a transport with the given client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if a timeout is out of range.
    pub fn new(config: ClientConfig) -> crate::Result<Self> {
        config.check()?;
        Ok(Self {
            config,
            pool: RwLock::new(HashMap::new()),
        })
    }

    /// Access the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of pooled clients.
    #[must_use]
    pub fn pooled_clients(&self) -> usize {
        self.pool.read().map(|pool| pool.len()).unwrap_or(0)
    }

    fn client_for(&self, endpoint: &ServerEndpoint) -> crate::Result<Client> {
        let key = endpoint.pool_key();

        if let Ok(pool) = self.pool.read() {
            if let Some(client) = pool.get(&key) {
                return Ok(client.clone());
            }
        }

        let client = self.build_client(endpoint)?;
        if let Ok(mut pool) = self.pool.write() {
            debug!(endpoint = %endpoint.host, port = endpoint.port, "pooling HTTP client");
            pool.entry(key).or_insert_with(|| client.clone());
        }
        Ok(client)
    }

    fn build_client(&self, endpoint: &ServerEndpoint) -> crate::Result<Client> {
        let mut builder = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(self.config.timeout())
            .connect_timeout(self.config.connect_timeout())
            .pool_idle_timeout(self.config.pool_idle_timeout())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host);

        if !self.config.enable_compression {
            builder = builder.no_gzip();
        }

        if endpoint.secure && !endpoint.tls_verify {
            warn!(endpoint = %endpoint.host, "TLS verification disabled for endpoint");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Credential::ClientCertificate { identity_pem } = &endpoint.credential {
            let identity = reqwest::Identity::from_pem(identity_pem.expose_secret().as_bytes())
                .map_err(|err| {
                    Error::AuthError(format!("Client certificate could not be loaded: {err}"))
                })?;
            builder = builder.use_rustls_tls().identity(identity);
        }

        builder
            .build()
            .map_err(|err| Error::NetworkError(format!("Failed to build HTTP client: {err}")))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self {
            config: ClientConfig::default(),
            pool: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, endpoint: &ServerEndpoint, request: &RemoteRequest) -> TransportOutcome {
        let client = self.client_for(endpoint)?;
        let url = build_url(&endpoint.base_url()?, &request.path)?;

        let mut builder = client
            .request(request.method.into(), url)
            .header("Accept", "application/json");

        match &endpoint.credential {
            Credential::Basic { username, key } => {
                builder = builder.basic_auth(username, Some(key.expose_secret()));
            }
            credential @ Credential::Token { .. } => {
                if let Some((header, value)) = credential.header_value() {
                    builder = builder.header(header, value);
                }
            }
            Credential::None | Credential::ClientCertificate { .. } => {}
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        info!(
            action = %request.action,
            method = %request.method,
            path = %request.path,
            endpoint = %endpoint.host,
            credential = endpoint.credential.kind(),
            "Sending container API request"
        );

        let response = builder.send().await.map_err(Error::from)?;
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await.map_err(Error::from)?;
            let body = parse_success_body(&request.response, &bytes, request)?;
            return Ok(RemotePayload {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.unwrap_or_default();
        Err(map_status_to_error(status, &text))
    }
}

/// Join a rendered path onto the endpoint base. The result must keep the
/// base origin and path prefix.
fn build_url(base: &Url, path: &str) -> crate::Result<Url> {
    let normalized = path.trim_start_matches('/');
    let url = base
        .join(normalized)
        .map_err(|err| Error::InvalidInput(format!("Invalid request path `{path}`: {err}")))?;

    if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
        return Err(Error::InvalidInput(format!(
            "Request path `{path}` leaves the endpoint base URL"
        )));
    }
    Ok(url)
}

fn parse_success_body(
    shape: &ResponseShape,
    bytes: &[u8],
    request: &RemoteRequest,
) -> crate::Result<Option<serde_json::Value>> {
    let ResponseShape::Json { pointer } = shape else {
        return Ok(None);
    };

    let value: serde_json::Value = serde_json::from_slice(bytes).map_err(|err| {
        Error::ProtocolError(format!(
            "Response to {} `{}` is not valid JSON: {err}",
            request.action, request.path
        ))
    })?;

    match pointer.as_deref() {
        None | Some("") => Ok(Some(value)),
        Some(pointer) => value.pointer(pointer).cloned().map(Some).ok_or_else(|| {
            Error::ProtocolError(format!(
                "Response to {} `{}` has no value at `{pointer}`",
                request.action, request.path
            ))
        }),
    }
}

fn map_status_to_error(status: StatusCode, text: &str) -> Error {
    let body = RemoteErrorBody::parse(text);
    let message = body.message.unwrap_or_else(|| {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        } else {
            trimmed.to_string()
        }
    });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::AuthError(format!("Container API refused credentials ({status}): {message}"))
        }
        _ => Error::RemoteRejected {
            status: status.as_u16(),
            code: body.code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HttpMethod;
    use lxd_core::types::LifecycleAction;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(server: &MockServer) -> ServerEndpoint {
        let address = server.address();
        ServerEndpoint::new(address.ip().to_string(), false)
            .unwrap()
            .with_port(address.port())
    }

    fn request(action: LifecycleAction, method: HttpMethod, path: &str) -> RemoteRequest {
        RemoteRequest {
            action,
            method,
            path: path.to_string(),
            body: None,
            response: ResponseShape::Ignore,
        }
    }

    #[test]
    fn test_build_url_stays_on_endpoint() {
        let base = Url::parse("http://lxd.internal:1111/1.0/").unwrap();
        assert_eq!(
            build_url(&base, "/instances/cloud1").unwrap().as_str(),
            "http://lxd.internal:1111/1.0/instances/cloud1"
        );
        assert_eq!(build_url(&base, "").unwrap(), base);

        for path in ["https:evil.example/instances/cloud1", "../x"] {
            let err = build_url(&base, path).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{path}");
        }
    }

    #[tokio::test]
    async fn test_create_sends_body_and_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/containers"))
            .and(body_json(json!({"name": "cloud1"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request(LifecycleAction::Create, HttpMethod::Post, "containers");
        req.body = Some(json!({"name": "cloud1"}));

        let payload = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap();
        assert_eq!(payload.status, 201);
        assert!(payload.body.is_none());
    }

    #[tokio::test]
    async fn test_bearer_token_header_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("Authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = endpoint(&server).with_credential(Credential::bearer("abc"));
        let req = request(LifecycleAction::TestConnection, HttpMethod::Get, "");
        assert!(HttpTransport::default().send(&endpoint, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_basic_auth_sent() {
        let server = MockServer::start().await;
        // admin:key
        Mock::given(method("GET"))
            .and(header("Authorization", "Basic YWRtaW46a2V5"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = endpoint(&server).with_credential(Credential::basic("admin", "key"));
        let req = request(LifecycleAction::TestConnection, HttpMethod::Get, "");
        assert!(HttpTransport::default().send(&endpoint, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "type": "error",
                "error": "not authorized",
                "error_code": 403
            })))
            .mount(&server)
            .await;

        let req = request(LifecycleAction::TestConnection, HttpMethod::Get, "");
        let err = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthError(msg) if msg.contains("not authorized")));
    }

    #[tokio::test]
    async fn test_not_found_is_non_retryable_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/containers/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "container not found",
                "error_code": 404
            })))
            .mount(&server)
            .await;

        let req = request(LifecycleAction::Terminate, HttpMethod::Delete, "containers/ghost");
        let err = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::RemoteRejected {
                status: 404,
                code: Some("404".to_string()),
                message: "container not found".to_string(),
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let req = request(LifecycleAction::Suspend, HttpMethod::Put, "containers/a/state");
        let err = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            Error::RemoteRejected { status: 503, message, .. } if message == "maintenance"
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_error_body_uses_reason_phrase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let req = request(LifecycleAction::Create, HttpMethod::Post, "containers");
        let err = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteRejected { message, .. } if message == "Conflict"));
    }

    #[tokio::test]
    async fn test_json_payload_extracted_by_pointer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/containers/cloud1/usage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "sync",
                "metadata": {"cpu": {"usage": 42}}
            })))
            .mount(&server)
            .await;

        let mut req = request(LifecycleAction::GetUsage, HttpMethod::Get, "containers/cloud1/usage");
        req.response = ResponseShape::Json {
            pointer: Some("/metadata".to_string()),
        };

        let payload = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap();
        assert_eq!(payload.body, Some(json!({"cpu": {"usage": 42}})));
    }

    #[tokio::test]
    async fn test_malformed_json_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let mut req = request(LifecycleAction::GetStats, HttpMethod::Get, "containers/a/state");
        req.response = ResponseShape::Json { pointer: None };

        let err = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolError(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_pointer_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"type": "sync"})))
            .mount(&server)
            .await;

        let mut req = request(LifecycleAction::GetUsage, HttpMethod::Get, "containers/a/usage");
        req.response = ResponseShape::Json {
            pointer: Some("/metadata".to_string()),
        };

        let err = HttpTransport::default()
            .send(&endpoint(&server), &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolError(msg) if msg.contains("/metadata")));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(ClientConfig::new().with_timeout(1)).unwrap();
        let req = request(LifecycleAction::Suspend, HttpMethod::Put, "containers/a/state");
        let err = transport.send(&endpoint(&server), &req).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_connection_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = ServerEndpoint::new("127.0.0.1", false)
            .unwrap()
            .with_port(port);
        let req = request(LifecycleAction::TestConnection, HttpMethod::Get, "");
        let err = HttpTransport::default()
            .send(&endpoint, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NetworkError(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_client_certificate_is_auth_error() {
        let endpoint = ServerEndpoint::new("127.0.0.1", true)
            .unwrap()
            .with_credential(Credential::ClientCertificate {
                identity_pem: "not a pem".to_string().into(),
            });
        let req = request(LifecycleAction::TestConnection, HttpMethod::Get, "");
        let err = HttpTransport::default()
            .send(&endpoint, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AuthError(_)));
    }

    #[tokio::test]
    async fn test_clients_pooled_per_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        let transport = HttpTransport::default();
        let req = request(LifecycleAction::TestConnection, HttpMethod::Get, "");
        let plain = endpoint(&server);
        let token = endpoint(&server).with_credential(Credential::bearer("t"));
        let unverified = endpoint(&server).with_tls_verify(false);

        transport.send(&plain, &req).await.unwrap();
        transport.send(&token, &req).await.unwrap();
        assert_eq!(transport.pooled_clients(), 1);

        transport.send(&unverified, &req).await.unwrap();
        assert_eq!(transport.pooled_clients(), 2);
    }

    #[test]
    fn test_transport_rejects_zero_timeout() {
        let result = HttpTransport::new(ClientConfig::new().with_timeout(0));
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
