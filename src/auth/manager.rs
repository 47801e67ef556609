//! OAuth token lifecycle
//!
//! Handles the authorization-code exchange, refresh and expiry checks for
//! every user known to the credential store. No credentials are cached in
//! memory: each operation reads and writes through the store.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::auth::provider::{OAuthProvider, TokenSet};
use crate::auth::store::{CredentialStore, TokenUpdate, UserCredentialRecord};
use crate::auth::tenant::{TenantConfig, TenantResolver};
use crate::config::google::PERSONAL_TENANT;
use crate::config::Config;
use crate::error::{AuthError, Result};

/// Lifetime assumed when the provider omits `expires_in`
const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

/// Current time as Unix epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Credentials ready to authorize a single Gmail API call
#[derive(Clone)]
pub struct AuthorizedClient {
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expiry_date: i64,
    /// OAuth client the tokens were issued to
    pub client_id: String,
}

impl fmt::Debug for AuthorizedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedClient")
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("expiry_date", &self.expiry_date)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Observable state of a user's stored credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialState {
    NoRecord,
    Valid,
    /// Expired but a refresh token is available
    Expired,
    /// Expired and the user has to authorize again
    ReauthorizationRequired,
}

/// Issues, refreshes and validates per-user OAuth tokens
pub struct TokenManager {
    resolver: TenantResolver,
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn OAuthProvider>,
    redirect_uri: String,
    scopes: Vec<String>,
    call_timeout: Duration,
    refresh_skew: Duration,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        resolver: TenantResolver,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn OAuthProvider>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            store,
            provider,
            redirect_uri: redirect_uri.into(),
            scopes: crate::config::google::SCOPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            call_timeout: Duration::from_secs(30),
            refresh_skew: Duration::ZERO,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build a manager from the gateway configuration
    pub fn from_config(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self::new(config.tenant_resolver(), store, provider, config.redirect_uri.clone())
            .with_scopes(config.scopes.clone())
            .with_timeout(config.http_timeout)
            .with_refresh_skew(config.refresh_skew)
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Bound every provider and store call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Refresh tokens this long before they actually expire
    pub fn with_refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Generate the authorization URL
    ///
    /// Uses the tenant of `email_hint` when given, otherwise the default tenant.
    pub fn authorization_url(&self, email_hint: Option<&str>) -> Result<String> {
        let config = self.config_for_hint(email_hint);
        if !config.is_configured() {
            return Err(AuthError::ConfigMissing {
                tenant: PERSONAL_TENANT.to_string(),
            }
            .into());
        }

        Ok(self
            .provider
            .authorization_url(config, &self.redirect_uri, &self.scopes))
    }

    /// Exchange an authorization code and store the resulting credentials
    pub async fn exchange_code(&self, code: &str, email_hint: Option<&str>) -> Result<UserCredentialRecord> {
        let config = self.config_for_hint(email_hint);
        tracing::info!(
            "OAuth callback started (email hint: {})",
            email_hint.unwrap_or("not provided")
        );

        let now = now_millis();
        let tokens = self
            .timed(
                "token exchange",
                self.provider.exchange_code(config, code, &self.redirect_uri),
            )
            .await
            .map_err(|e| {
                tracing::error!("Token exchange error: {}", e);
                e
            })?;

        tracing::debug!(
            "Tokens received: refresh_token {}",
            if tokens.refresh_token.is_some() { "Set" } else { "Not Set" }
        );

        let identity = self
            .timed("identity lookup", self.provider.fetch_identity(&tokens.access_token))
            .await?;

        let expiry_date = expiry_from(&tokens, now);

        // Google omits the refresh token when consent was granted before.
        let refresh_token = match tokens.refresh_token {
            Some(token) => Some(token),
            None => self
                .timed("credential lookup", self.store.find(&identity.email))
                .await?
                .and_then(|existing| existing.refresh_token),
        };

        let record = UserCredentialRecord {
            email: identity.email,
            name: identity.name,
            picture: identity.picture,
            access_token: tokens.access_token,
            refresh_token,
            expiry_date,
            token_type: tokens.token_type,
            scope: tokens.scope,
        };

        let stored = self.timed("credential upsert", self.store.upsert(&record)).await?;
        tracing::info!("Stored credentials for {}", stored.email);
        Ok(stored)
    }

    /// Read the stored credentials for `email`
    pub async fn load_record(&self, email: &str) -> Result<UserCredentialRecord> {
        self.timed("credential lookup", self.store.find(email))
            .await?
            .ok_or_else(|| {
                AuthError::NotFound {
                    email: email.to_string(),
                }
                .into()
            })
    }

    /// Whether the access token is expired at `now_ms`; equal timestamps count as expired.
    pub fn is_expired(record: &UserCredentialRecord, now_ms: i64) -> bool {
        now_ms >= record.expiry_date
    }

    /// Refresh the access token for `email` and persist it
    pub async fn refresh(&self, email: &str) -> Result<UserCredentialRecord> {
        let lease = self.refresh_lock(email);
        let _guard = lease.lock.lock().await;
        self.refresh_locked(email).await
    }

    /// Credentials guaranteed not to be expired at the time of return
    pub async fn get_valid_client(&self, email: &str) -> Result<AuthorizedClient> {
        let mut record = self.load_record(email).await?;

        if self.needs_refresh(&record) {
            let lease = self.refresh_lock(email);
            let _guard = lease.lock.lock().await;

            // Another request may have refreshed while we waited.
            record = self.load_record(email).await?;
            if self.needs_refresh(&record) {
                tracing::info!("Token expired for {}, refreshing", email);
                self.refresh_locked(email).await?;
                record = self.load_record(email).await?;
            }
        }

        Ok(AuthorizedClient {
            client_id: self.resolver.resolve(email).client_id.clone(),
            email: record.email,
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            token_type: record.token_type,
            expiry_date: record.expiry_date,
        })
    }

    /// Classify the stored credential for `email` without side effects
    pub async fn credential_state(&self, email: &str) -> Result<CredentialState> {
        let record = match self.timed("credential lookup", self.store.find(email)).await? {
            Some(record) => record,
            None => return Ok(CredentialState::NoRecord),
        };

        Ok(match (self.needs_refresh(&record), record.refresh_token.is_some()) {
            (false, _) => CredentialState::Valid,
            (true, true) => CredentialState::Expired,
            (true, false) => CredentialState::ReauthorizationRequired,
        })
    }

    async fn refresh_locked(&self, email: &str) -> Result<UserCredentialRecord> {
        let mut record = self.load_record(email).await?;
        let refresh_token = record
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::NoRefreshToken {
                email: email.to_string(),
            })?;

        let config = self.resolver.resolve(email);
        let tokens = self
            .timed("token refresh", self.provider.refresh_token(config, &refresh_token))
            .await
            .map_err(|e| {
                tracing::error!("Refresh token error for {}: {}", email, e);
                e
            })?;

        let update = TokenUpdate {
            expiry_date: expiry_from(&tokens, now_millis()),
            access_token: tokens.access_token,
        };
        self.timed("token update", self.store.update_tokens(email, &update))
            .await?;

        record.access_token = update.access_token;
        record.expiry_date = update.expiry_date;
        Ok(record)
    }

    fn needs_refresh(&self, record: &UserCredentialRecord) -> bool {
        let skew = i64::try_from(self.refresh_skew.as_millis()).unwrap_or(i64::MAX);
        Self::is_expired(record, now_millis().saturating_add(skew))
    }

    fn config_for_hint(&self, email_hint: Option<&str>) -> &TenantConfig {
        match email_hint.filter(|e| !e.is_empty()) {
            Some(email) => self.resolver.resolve(email),
            None => self.resolver.resolve_default(),
        }
    }

    fn refresh_lock(&self, email: &str) -> RefreshLease<'_> {
        let mut locks = self
            .refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        RefreshLease {
            locks: &self.refresh_locks,
            email: email.to_string(),
            lock: locks.entry(email.to_string()).or_default().clone(),
        }
    }

    #[cfg(test)]
    fn refresh_lock_count(&self) -> usize {
        self.refresh_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Transient {
                operation: operation.to_string(),
            }
            .into()),
        }
    }
}

/// Shared handle on a per-email refresh mutex
///
/// The map entry is removed when the last handle drops, so the map only
/// holds emails with a refresh in flight.
struct RefreshLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    email: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One handle is ours, one is the map's.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.email);
        }
    }
}

fn expiry_from(tokens: &TokenSet, now_ms: i64) -> i64 {
    let ttl = tokens.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    now_ms.saturating_add(ttl.saturating_mul(1000))
}
