//! Identity attribute lookup.
//!
//! Maps a verified username to the account attributes forwarded upstream in
//! place of the raw bearer token. The pipeline depends only on the
//! [`IdentityResolver`] trait; [`CognitoIdentityResolver`] calls the user
//! pool's `AdminGetUser` operation through the AWS SDK.
//!
//! # Security
//!
//! - Requests are SigV4-signed with credentials from the default provider chain
//! - Retries are disabled and the operation has a timeout
//! - Provider error bodies are logged, never returned to callers

use crate::case_transform::to_lower_camel;
use aws_sdk_cognitoidentityprovider as cognito;
use aws_sdk_cognitoidentityprovider::config::retry::RetryConfig;
use aws_sdk_cognitoidentityprovider::config::timeout::TimeoutConfig;
use aws_sdk_cognitoidentityprovider::config::{BehaviorVersion, Region};
use aws_sdk_cognitoidentityprovider::error::DisplayErrorContext;
use aws_sdk_cognitoidentityprovider::operation::admin_get_user::AdminGetUserOutput;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

/// Default timeout for identity lookups in seconds.
const IDENTITY_REQUEST_TIMEOUT_SECS: u64 = 10;

/// One `{name, value}` account attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeField {
    pub name: String,
    pub value: String,
}

/// Account attributes attached to an authenticated request.
///
/// Serialized in lowerCamel with RFC 3339 timestamps, e.g.
/// `{"enabled":true,"attributes":[{"name":"emailVerified","value":"true"}],...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityAttributes {
    pub enabled: bool,
    pub attributes: Vec<AttributeField>,
    pub created_date: Option<DateTime<Utc>>,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub username: String,
    pub status: String,
}

impl IdentityAttributes {
    /// Value of the attribute with the given (lowerCamel) name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user not found")]
    NotFound,

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl IdentityError {
    /// Stable label for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            IdentityError::NotFound => "identity_not_found",
            IdentityError::ProviderUnavailable(_) => "identity_unavailable",
        }
    }
}

/// Capability to resolve a username into account attributes.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, username: &str) -> Result<IdentityAttributes, IdentityError>;
}

fn to_utc(date: &cognito::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(date.secs(), date.subsec_nanos())
}

impl From<&AdminGetUserOutput> for IdentityAttributes {
    fn from(output: &AdminGetUserOutput) -> Self {
        Self {
            enabled: output.enabled(),
            attributes: output
                .user_attributes()
                .iter()
                .map(|attr| AttributeField {
                    name: to_lower_camel(attr.name()),
                    value: attr.value().unwrap_or_default().to_string(),
                })
                .collect(),
            created_date: output.user_create_date().and_then(to_utc),
            last_modified_date: output.user_last_modified_date().and_then(to_utc),
            username: output.username().to_string(),
            status: output
                .user_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// `AdminGetUser` client for the configured user pool.
#[derive(Clone)]
pub struct CognitoIdentityResolver {
    client: cognito::Client,
    pool_id: String,
}

impl CognitoIdentityResolver {
    /// Resolver for `pool_id` in `region`, credentials from the environment.
    ///
    /// `endpoint_url` overrides the regional endpoint (local emulators, tests).
    pub async fn from_env(region: &str, pool_id: String, endpoint_url: Option<String>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = cognito::config::Builder::from(&shared)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(IDENTITY_REQUEST_TIMEOUT_SECS))
                    .build(),
            );
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }

        Self::from_conf(builder.build(), pool_id)
    }

    /// Resolver over an explicit SDK configuration.
    pub fn from_conf(config: cognito::Config, pool_id: String) -> Self {
        Self {
            client: cognito::Client::from_conf(config),
            pool_id,
        }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for CognitoIdentityResolver {
    #[instrument(skip_all)]
    async fn resolve(&self, username: &str) -> Result<IdentityAttributes, IdentityError> {
        let output = self
            .client
            .admin_get_user()
            .user_pool_id(&self.pool_id)
            .username(username)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_user_not_found_exception() {
                    return IdentityError::NotFound;
                }
                warn!(
                    target: "gateway.services.identity",
                    error = %DisplayErrorContext(&service_error),
                    "Identity lookup failed"
                );
                IdentityError::ProviderUnavailable(service_error.to_string())
            })?;

        Ok(IdentityAttributes::from(&output))
    }
}

/// Mock identity resolver for tests.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Fixed(IdentityAttributes),
        EchoUsername,
        NotFound,
        Unavailable,
    }

    /// Returns canned attributes and counts calls.
    pub struct MockIdentityResolver {
        behavior: Behavior,
        call_count: AtomicUsize,
    }

    impl MockIdentityResolver {
        /// Always return `attributes`, whatever username is asked for.
        pub fn with_attributes(attributes: IdentityAttributes) -> Self {
            Self::new(Behavior::Fixed(attributes))
        }

        /// Return default attributes carrying the requested username.
        pub fn echoing() -> Self {
            Self::new(Behavior::EchoUsername)
        }

        pub fn not_found() -> Self {
            Self::new(Behavior::NotFound)
        }

        pub fn unavailable() -> Self {
            Self::new(Behavior::Unavailable)
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                call_count: AtomicUsize::new(0),
            }
        }
    }

    /// Attributes for an enabled, confirmed user.
    pub fn sample_attributes(username: &str) -> IdentityAttributes {
        IdentityAttributes {
            enabled: true,
            attributes: vec![
                AttributeField {
                    name: "email".to_string(),
                    value: format!("{}@example.com", username),
                },
                AttributeField {
                    name: "emailVerified".to_string(),
                    value: "true".to_string(),
                },
            ],
            created_date: DateTime::<Utc>::from_timestamp(1_600_000_000, 0),
            last_modified_date: DateTime::<Utc>::from_timestamp(1_650_000_000, 0),
            username: username.to_string(),
            status: "CONFIRMED".to_string(),
        }
    }

    #[async_trait::async_trait]
    impl IdentityResolver for MockIdentityResolver {
        async fn resolve(&self, username: &str) -> Result<IdentityAttributes, IdentityError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            match &self.behavior {
                Behavior::Fixed(attributes) => Ok(attributes.clone()),
                Behavior::EchoUsername => Ok(sample_attributes(username)),
                Behavior::NotFound => Err(IdentityError::NotFound),
                Behavior::Unavailable => Err(IdentityError::ProviderUnavailable(
                    "mock provider unavailable".to_string(),
                )),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::*;
    use super::*;
    use aws_sdk_cognitoidentityprovider::config::Credentials;
    use wiremock::matchers::{body_json, header, header_regex, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AMZ_JSON: &str = "application/x-amz-json-1.1";

    fn resolver_for(endpoint: &str) -> CognitoIdentityResolver {
        let config = cognito::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                "AKIDEXAMPLE",
                "example-secret",
                None,
                None,
                "static",
            ))
            .retry_config(RetryConfig::disabled())
            .endpoint_url(endpoint)
            .build();
        CognitoIdentityResolver::from_conf(config, "us-east-1_pool".to_string())
    }

    fn provider_error(status: u16, error_type: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_raw(
            serde_json::json!({"__type": error_type, "message": "provider says no"}).to_string(),
            AMZ_JSON,
        )
    }

    #[test]
    fn test_identity_attributes_serialize_lower_camel() {
        let attrs = sample_attributes("alice");
        let json = serde_json::to_value(&attrs).unwrap();

        assert_eq!(json["enabled"], true);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["status"], "CONFIRMED");
        assert_eq!(json["createdDate"], "2020-09-13T12:26:40Z");
        assert!(json.get("lastModifiedDate").is_some());
        assert_eq!(json["attributes"][1]["name"], "emailVerified");
        assert!(json.get("created_date").is_none());
    }

    #[tokio::test]
    async fn test_resolve_sends_signed_admin_get_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header(
                "x-amz-target",
                "AWSCognitoIdentityProviderService.AdminGetUser",
            ))
            .and(header_regex("authorization", "^AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"))
            .and(body_json(serde_json::json!({
                "UserPoolId": "us-east-1_pool",
                "Username": "alice"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                serde_json::json!({
                    "Enabled": true,
                    "Username": "alice",
                    "UserStatus": "CONFIRMED",
                    "UserCreateDate": 1600000000.5,
                    "UserAttributes": [
                        {"Name": "given_name", "Value": "Alice"},
                        {"Name": "email_verified", "Value": "true"},
                        {"Name": "custom:tenant_id", "Value": "t-1"}
                    ]
                })
                .to_string(),
                AMZ_JSON,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let attrs = resolver_for(&server.uri()).resolve("alice").await.unwrap();

        assert!(attrs.enabled);
        assert_eq!(attrs.username, "alice");
        assert_eq!(attrs.status, "CONFIRMED");
        assert_eq!(attrs.attribute("givenName"), Some("Alice"));
        assert_eq!(attrs.attribute("emailVerified"), Some("true"));
        assert_eq!(attrs.attribute("customTenantId"), Some("t-1"));
        assert_eq!(
            attrs.created_date.unwrap().timestamp_millis(),
            1_600_000_000_500
        );
        assert!(attrs.last_modified_date.is_none());
    }

    #[tokio::test]
    async fn test_user_not_found_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(provider_error(400, "UserNotFoundException"))
            .expect(1)
            .mount(&server)
            .await;

        let result = resolver_for(&server.uri()).resolve("ghost").await;
        assert!(matches!(result, Err(IdentityError::NotFound)));
    }

    #[tokio::test]
    async fn test_other_provider_errors_map_to_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(provider_error(400, "NotAuthorizedException"))
            .mount(&server)
            .await;

        let result = resolver_for(&server.uri()).resolve("alice").await;
        assert!(matches!(result, Err(IdentityError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(provider_error(500, "InternalErrorException"))
            .expect(1)
            .mount(&server)
            .await;

        let result = resolver_for(&server.uri()).resolve("alice").await;
        assert!(matches!(result, Err(IdentityError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_provider_maps_to_unavailable() {
        let result = resolver_for("http://127.0.0.1:1").resolve("alice").await;
        assert!(matches!(result, Err(IdentityError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_mock_resolver_counts_calls() {
        let resolver = MockIdentityResolver::echoing();
        let attrs = resolver.resolve("bob").await.unwrap();
        assert_eq!(attrs.username, "bob");

        let _ = resolver.resolve("carol").await;
        assert_eq!(resolver.call_count(), 2);

        let failing = MockIdentityResolver::not_found();
        assert!(matches!(
            failing.resolve("x").await,
            Err(IdentityError::NotFound)
        ));
        assert_eq!(failing.call_count(), 1);
    }
}
