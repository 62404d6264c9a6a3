//! Test server harness for E2E testing
//!
//! Provides `TestAuthorizerServer` for spawning real authorizer instances
//! whose signing keys come from a wiremock JWKS endpoint.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use crate::token_builders::{TEST_CLIENT_ID, TEST_ISSUER};
use authorizer::auth::{HttpKeySetFetcher, SystemClock};
use authorizer::config::Config;
use authorizer::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock identity provider serves its key set on.
pub const TEST_JWKS_PATH: &str = "/.well-known/jwks.json";

/// Resource identifier sent with every harness invocation.
pub const TEST_METHOD_ARN: &str =
    "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/collections";

/// Test harness for spawning the authorizer in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_allow_flow() -> Result<()> {
///     let server = TestAuthorizerServer::spawn().await?;
///     let token = server.keypair().sign(&TokenClaimsBuilder::valid("user-1").build());
///
///     let response = server.authorize(Some(&format!("Bearer {token}"))).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestAuthorizerServer {
    addr: SocketAddr,
    config: Config,
    state: Arc<AppState>,
    keypair: TestKeypair,
    mock_server: MockServer,
    client: reqwest::Client,
    _handle: JoinHandle<()>,
}

impl TestAuthorizerServer {
    /// Spawn a server whose JWKS endpoint serves the default test keypair.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        let keypair = TestKeypair::new(1, "test-key-01");
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(&[&keypair])))
            .mount(&mock_server)
            .await;

        Self::spawn_with(keypair, mock_server, HashMap::new()).await
    }

    /// Spawn a server against a caller-prepared mock JWKS server.
    ///
    /// The caller mounts whatever responses the test needs on `mock_server`
    /// at [`TEST_JWKS_PATH`]. Entries in `overrides` replace the default
    /// configuration variables.
    pub async fn spawn_with(
        keypair: TestKeypair,
        mock_server: MockServer,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("AUTHORIZER_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("AUTHORIZER_AUDIENCE".to_string(), TEST_CLIENT_ID.to_string()),
            ("AUTHORIZER_ALLOWED_ALGORITHMS".to_string(), "EdDSA".to_string()),
            (
                "AUTHORIZER_JWKS_URL".to_string(),
                format!("{}{}", mock_server.uri(), TEST_JWKS_PATH),
            ),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let fetcher = Arc::new(HttpKeySetFetcher::new(
            config.jwks_url.clone(),
            config.jwks_fetch_timeout,
        ));
        let state = Arc::new(AppState::new(
            config.clone(),
            fetcher,
            Arc::new(SystemClock),
        ));

        // Recorder is not installed globally; tests only need a handle
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(Arc::clone(&state), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            state,
            keypair,
            mock_server,
            client: reqwest::Client::new(),
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the shared application state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Keypair whose public half the mock JWKS endpoint serves.
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    /// Mock identity provider, for mounting extra responses or checking calls.
    pub fn mock_server(&self) -> &MockServer {
        &self.mock_server
    }

    /// Number of requests the mock JWKS endpoint has received.
    pub async fn jwks_requests(&self) -> usize {
        self.mock_server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == TEST_JWKS_PATH)
                    .count()
            })
            .unwrap_or(0)
    }

    /// POST a gateway invocation for [`TEST_METHOD_ARN`].
    ///
    /// `None` omits the authorization field entirely.
    pub async fn authorize(
        &self,
        authorization: Option<&str>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut event = serde_json::json!({
            "type": "TOKEN",
            "methodArn": TEST_METHOD_ARN,
            "requestContext": {
                "requestId": "test-request",
                "identity": {"sourceIp": "203.0.113.7"}
            }
        });
        if let Some(authorization) = authorization {
            event["authorizationToken"] = serde_json::Value::from(authorization);
        }

        let response = self
            .client
            .post(format!("{}/authorize", self.url()))
            .json(&event)
            .send()
            .await?;
        Ok(response)
    }

    /// GET a path on the server.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response, anyhow::Error> {
        let response = self
            .client
            .get(format!("{}{}", self.url(), path))
            .send()
            .await?;
        Ok(response)
    }
}

impl Drop for TestAuthorizerServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
