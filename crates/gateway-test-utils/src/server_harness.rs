//! In-process gateway harness for integration tests
//!
//! Provides `TestGateway`: the real router and pipeline, wired to a wiremock
//! JWKS endpoint, a wiremock upstream backend, and a mock identity resolver.

use crate::crypto_fixtures::TestKeypair;
use crate::token_builders::TestClaims;
use auth_gateway::auth::KeySetLoader;
use auth_gateway::config::Config;
use auth_gateway::context::GatewayContext;
use auth_gateway::routes::{self, AppState};
use auth_gateway::services::identity::mock::MockIdentityResolver;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Audience every harness token is issued for.
pub const TEST_CLIENT_ID: &str = "test-client-id";

/// JWKS path served by the mock key-set endpoint.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Test harness for the gateway.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_proxy_flow() -> Result<()> {
///     let gateway = TestGateway::start().await?;
///     Mock::given(method("GET"))
///         .respond_with(ResponseTemplate::new(200))
///         .mount(gateway.upstream())
///         .await;
///
///     let token = gateway.token_for("alice");
///     let response = gateway
///         .router()
///         .oneshot(gateway.request("GET", "/things", Some(&token), None))
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGateway {
    jwks_server: MockServer,
    upstream: MockServer,
    keypair: TestKeypair,
    identity: Arc<MockIdentityResolver>,
    config: Config,
    router: Router,
    server_handle: Option<JoinHandle<()>>,
}

impl TestGateway {
    /// Start with an identity resolver that echoes the token's username.
    pub async fn start() -> Result<Self, anyhow::Error> {
        Self::start_with_identity(MockIdentityResolver::echoing()).await
    }

    /// Start with a specific identity resolver.
    ///
    /// The key set is fetched once from the mock JWKS endpoint through the
    /// gateway's real loader.
    pub async fn start_with_identity(
        identity: MockIdentityResolver,
    ) -> Result<Self, anyhow::Error> {
        let jwks_server = MockServer::start().await;
        let upstream = MockServer::start().await;
        let keypair = TestKeypair::new(1, "test-key-01");

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(keypair.jwks_json()))
            .mount(&jwks_server)
            .await;

        let vars = HashMap::from([
            ("PORT".to_string(), "0".to_string()),
            ("URL".to_string(), upstream.uri()),
            ("POOL_ID".to_string(), "us-test-1_pool".to_string()),
            ("CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            ("AWS_REGION".to_string(), "us-test-1".to_string()),
            ("IDENTITY_URL".to_string(), "http://127.0.0.1:1".to_string()),
            (
                "JWKS_URL".to_string(),
                format!("{}{}", jwks_server.uri(), JWKS_PATH),
            ),
            ("UPSTREAM_TIMEOUT_SECONDS".to_string(), "5".to_string()),
            ("REQUEST_TIMEOUT_SECONDS".to_string(), "10".to_string()),
        ]);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let jwks_url = config
            .jwks_url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("JWKS_URL missing from test config"))?;
        let key_set = KeySetLoader::new()
            .load_from_url(&jwks_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to load test key set: {}", e))?;

        let identity = Arc::new(identity);
        let context = GatewayContext::new(config.clone(), Arc::new(key_set), identity.clone())
            .map_err(|e| anyhow::anyhow!("Failed to build gateway context: {}", e))?;

        let router = routes::build_routes(AppState::new(&context));

        Ok(Self {
            jwks_server,
            upstream,
            keypair,
            identity,
            config,
            router,
            server_handle: None,
        })
    }

    /// A fresh clone of the gateway router, ready for `oneshot`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The mock upstream backend; mount expectations here.
    pub fn upstream(&self) -> &MockServer {
        &self.upstream
    }

    pub fn jwks_server(&self) -> &MockServer {
        &self.jwks_server
    }

    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    pub fn identity(&self) -> &MockIdentityResolver {
        &self.identity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A valid token for `username`, issued for the harness client id.
    pub fn token_for(&self, username: &str) -> String {
        self.keypair
            .sign_token(&TestClaims::for_user(username).with_audience(TEST_CLIENT_ID))
    }

    /// Build a request, optionally with a bearer token and a JSON body.
    pub fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).expect("Failed to build test request")
    }

    /// Serve the router on a random local port and return its base URL.
    ///
    /// The server is aborted when the harness is dropped.
    pub async fn serve(&mut self) -> Result<String, anyhow::Error> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let app = self.router.clone();
        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });
        self.server_handle = Some(handle);

        Ok(format!("http://{}", addr))
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}
