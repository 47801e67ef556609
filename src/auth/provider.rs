//! OAuth 2.0 provider calls
//!
//! The token manager talks to the identity provider only through the
//! [`OAuthProvider`] trait, so tests can substitute a scripted provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::auth::tenant::TenantConfig;
use crate::config::google;
use crate::error::{AuthError, GatewayError, Result};

/// Tokens returned by a code exchange or refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: Option<i64>,
    pub scope: String,
}

/// Profile of the user who granted consent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

/// Operations against the OAuth identity provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Build the consent URL for the given client.
    fn authorization_url(&self, config: &TenantConfig, redirect_uri: &str, scopes: &[String]) -> String;

    /// Exchange a single-use authorization code for tokens.
    async fn exchange_code(&self, config: &TenantConfig, code: &str, redirect_uri: &str) -> Result<TokenSet>;

    /// Mint a new access token from a refresh token.
    async fn refresh_token(&self, config: &TenantConfig, refresh_token: &str) -> Result<TokenSet>;

    /// Fetch the profile of the user owning `access_token`.
    async fn fetch_identity(&self, access_token: &str) -> Result<Identity>;
}

/// Token response from OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl From<TokenResponse> for TokenSet {
    fn from(resp: TokenResponse) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_type: resp.token_type,
            expires_in: resp.expires_in,
            scope: resp.scope,
        }
    }
}

/// Error body from OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Person {
    #[serde(default)]
    names: Vec<PersonName>,
    #[serde(default)]
    email_addresses: Vec<PersonEmail>,
    #[serde(default)]
    photos: Vec<PersonPhoto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersonName {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonEmail {
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonPhoto {
    url: Option<String>,
}

impl From<Person> for Identity {
    fn from(person: Person) -> Self {
        Self {
            email: person
                .email_addresses
                .into_iter()
                .find_map(|e| e.value)
                .unwrap_or_else(|| "unknown".to_string()),
            name: person
                .names
                .into_iter()
                .find_map(|n| n.display_name)
                .unwrap_or_else(|| "unknown".to_string()),
            picture: person.photos.into_iter().find_map(|p| p.url),
        }
    }
}

/// Google OAuth 2.0 and People API client
pub struct GoogleProvider {
    http_client: reqwest::Client,
    auth_url: String,
    token_url: String,
    people_url: String,
}

impl GoogleProvider {
    /// Create a provider talking to Google's production endpoints
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_endpoints(timeout, google::AUTH_URL, google::TOKEN_URL, google::PEOPLE_ME_URL)
    }

    /// Create a provider with custom endpoints
    pub fn with_endpoints(
        timeout: Duration,
        auth_url: &str,
        token_url: &str,
        people_url: &str,
    ) -> Result<Self> {
        Ok(Self {
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            people_url: people_url.to_string(),
        })
    }

    async fn token_request(&self, params: &[(&str, &str)], operation: &str) -> Result<TokenSet> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| provider_error(e, operation))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(token_endpoint_error(status, &text, operation));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| provider_error(e, operation))?;
        Ok(token_response.into())
    }
}

/// Translate a failed token endpoint response. A rejected grant is reported
/// separately so callers can ask the user to restart authorization.
fn token_endpoint_error(status: reqwest::StatusCode, body: &str, operation: &str) -> GatewayError {
    let parsed: Option<TokenErrorResponse> = serde_json::from_str(body).ok();
    let is_invalid_grant = match &parsed {
        Some(err) => err.error == "invalid_grant",
        None => body.contains("invalid_grant"),
    };

    if is_invalid_grant && operation == "token exchange" {
        return AuthError::InvalidGrant.into();
    }

    let detail = match parsed {
        Some(TokenErrorResponse {
            error,
            error_description: Some(description),
        }) => format!("{}: {}", error, description),
        Some(TokenErrorResponse { error, .. }) => error,
        None => body.to_string(),
    };

    AuthError::Provider {
        message: format!("{} failed ({}): {}", operation, status, detail),
    }
    .into()
}

fn provider_error(err: reqwest::Error, operation: &str) -> GatewayError {
    if err.is_timeout() {
        AuthError::Transient {
            operation: operation.to_string(),
        }
        .into()
    } else {
        AuthError::Provider {
            message: format!("{}: {}", operation, err),
        }
        .into()
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn authorization_url(&self, config: &TenantConfig, redirect_uri: &str, scopes: &[String]) -> String {
        let scopes = scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&config.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes)
        )
    }

    async fn exchange_code(&self, config: &TenantConfig, code: &str, redirect_uri: &str) -> Result<TokenSet> {
        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        self.token_request(&params, "token exchange").await
    }

    async fn refresh_token(&self, config: &TenantConfig, refresh_token: &str) -> Result<TokenSet> {
        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        self.token_request(&params, "token refresh").await
    }

    async fn fetch_identity(&self, access_token: &str) -> Result<Identity> {
        let response = self
            .http_client
            .get(&self.people_url)
            .query(&[("personFields", "names,emailAddresses,photos")])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| provider_error(e, "identity lookup"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::Provider {
                message: format!("identity lookup failed ({}): {}", status, text),
            }
            .into());
        }

        let person: Person = response
            .json()
            .await
            .map_err(|e| provider_error(e, "identity lookup"))?;
        Ok(person.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GoogleProvider {
        GoogleProvider::with_endpoints(
            Duration::from_secs(5),
            "https://accounts.example/auth",
            &format!("{}/token", server.uri()),
            &format!("{}/v1/people/me", server.uri()),
        )
        .unwrap()
    }

    fn tenant() -> TenantConfig {
        TenantConfig::new("client-id", "client-secret")
    }

    #[tokio::test]
    async fn test_authorization_url_forces_consent() {
        let server = MockServer::start().await;
        let url = provider(&server).authorization_url(
            &tenant(),
            "http://localhost:3000/auth/google/callback",
            &["scope-a".to_string(), "scope-b".to_string()],
        );

        assert!(url.starts_with("https://accounts.example/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("scope=scope-a%20scope-b"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fgoogle%2Fcallback"));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=good-code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "expires_in": 3599,
                "token_type": "Bearer",
                "scope": "gmail.modify"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = provider(&server)
            .exchange_code(&tenant(), "good-code", "http://localhost/cb")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(tokens.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_exchange_invalid_grant_is_distinct() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Bad Request"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .exchange_code(&tenant(), "bad-code", "http://localhost/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Auth(AuthError::InvalidGrant)));
    }

    #[tokio::test]
    async fn test_other_exchange_failures_are_provider_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .exchange_code(&tenant(), "code", "http://localhost/cb")
            .await
            .unwrap_err();
        match err {
            GatewayError::Auth(AuthError::Provider { message }) => {
                assert!(message.contains("invalid_client"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_sends_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=stored-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = provider(&server)
            .refresh_token(&tenant(), "stored-refresh")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_fetch_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/people/me"))
            .and(query_param("personFields", "names,emailAddresses,photos"))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "names": [{"displayName": "Ada Lovelace"}],
                "emailAddresses": [{"value": "ada@gmail.com"}],
                "photos": [{"url": "https://photos.example/ada.png"}]
            })))
            .mount(&server)
            .await;

        let identity = provider(&server).fetch_identity("access").await.unwrap();
        assert_eq!(identity.email, "ada@gmail.com");
        assert_eq!(identity.name, "Ada Lovelace");
        assert_eq!(identity.picture.as_deref(), Some("https://photos.example/ada.png"));
    }

    #[test]
    fn test_empty_person_defaults_to_unknown() {
        let identity: Identity = Person::default().into();
        assert_eq!(identity.email, "unknown");
        assert_eq!(identity.name, "unknown");
        assert!(identity.picture.is_none());
    }
}
