//! Configuration management for the Gmail MCP Gateway
//!
//! Everything is read from environment variables (optionally via a `.env`
//! file loaded by the binary).

use std::time::Duration;

use crate::auth::tenant::{TenantConfig, TenantResolver, TenantRule};
use crate::error::{ConfigError, GatewayError, Result};

/// Configuration for the Gmail MCP Gateway
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface to bind the HTTP server to
    pub host: String,

    /// HTTP listening port
    pub port: u16,

    /// OAuth redirect URI shared by every tenant
    pub redirect_uri: String,

    /// Default tenant ("personal") credentials
    pub personal: TenantConfig,

    /// Tenant A credentials
    pub company_a: TenantConfig,

    /// Tenant B credentials
    pub company_b: TenantConfig,

    /// Domain substring routing an email to tenant A
    pub company_a_domain: String,

    /// Domain substring routing an email to tenant B
    pub company_b_domain: String,

    /// Supabase project URL (credential store)
    pub supabase_url: Option<String>,

    /// Supabase API key
    pub supabase_key: Option<String>,

    /// Upper bound on any single provider, store or Gmail call
    pub http_timeout: Duration,

    /// Tokens expiring within this margin are treated as expired
    pub refresh_skew: Duration,

    /// OAuth scopes requested during authorization
    pub scopes: Vec<String>,
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let tenant = |id_key: &str, secret_key: &str| TenantConfig {
            client_id: var(id_key).unwrap_or_default(),
            client_secret: var(secret_key).unwrap_or_default(),
        };

        let port = parse_var(&var, "PORT", 3000u16)?;
        let timeout_secs = parse_var(&var, "GATEWAY_HTTP_TIMEOUT_SECS", 30u64)?;
        let skew_secs = parse_var(&var, "REFRESH_SKEW_SECS", 0u64)?;

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            redirect_uri: var("GOOGLE_REDIRECT_URI")
                .unwrap_or_else(|| format!("http://localhost:{}/auth/google/callback", port)),
            personal: tenant("GOOGLE_CLIENT_ID_PERSONAL", "GOOGLE_CLIENT_SECRET_PERSONAL"),
            company_a: tenant("GOOGLE_CLIENT_ID_COMPANY_A", "GOOGLE_CLIENT_SECRET_COMPANY_A"),
            company_b: tenant("GOOGLE_CLIENT_ID_COMPANY_B", "GOOGLE_CLIENT_SECRET_COMPANY_B"),
            company_a_domain: var("TENANT_A_DOMAIN")
                .unwrap_or_else(|| "stceciliacare.com".to_string()),
            company_b_domain: var("TENANT_B_DOMAIN")
                .unwrap_or_else(|| "summerhillcare.uk".to_string()),
            supabase_url: var("SUPABASE_URL"),
            supabase_key: var("SUPABASE_ANON_KEY"),
            http_timeout: Duration::from_secs(timeout_secs),
            refresh_skew: Duration::from_secs(skew_secs),
            scopes: google::SCOPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Build the tenant resolver described by this configuration
    pub fn tenant_resolver(&self) -> TenantResolver {
        TenantResolver::new(
            self.personal.clone(),
            vec![
                TenantRule::suffix(google::PERSONAL_TENANT, "@gmail.com", self.personal.clone()),
                TenantRule::contains("companyA", &self.company_a_domain, self.company_a.clone()),
                TenantRule::contains("companyB", &self.company_b_domain, self.company_b.clone()),
            ],
        )
    }

    /// Whether a Supabase credential store is configured
    pub fn has_supabase(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_key.is_some()
    }
}

fn parse_var<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| {
            GatewayError::Config(ConfigError::InvalidEnvVar {
                var: key.to_string(),
                message: e.to_string(),
            })
        }),
        None => Ok(default),
    }
}

/// Google OAuth and People API constants
pub mod google {
    /// Authorization endpoint
    pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

    /// Token endpoint (code exchange and refresh)
    pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

    /// People API profile of the authorized user
    pub const PEOPLE_ME_URL: &str = "https://people.googleapis.com/v1/people/me";

    /// Name of the default tenant
    pub const PERSONAL_TENANT: &str = "personal";

    /// Scopes requested on every authorization
    pub const SCOPES: &[&str] = &[
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/gmail.send",
        "https://www.googleapis.com/auth/gmail.modify",
        "https://www.googleapis.com/auth/userinfo.email",
        "https://www.googleapis.com/auth/userinfo.profile",
    ];
}

/// Gmail API constants
pub mod gmail {
    /// Base URL for Gmail API
    pub const API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";

    /// User ID for the authenticated user
    pub const USER_ID: &str = "me";

    pub mod labels {
        pub const INBOX: &str = "INBOX";
        pub const UNREAD: &str = "UNREAD";
    }
}

/// Credential store constants
pub mod store {
    /// Table holding one row per authorized user
    pub const USERS_TABLE: &str = "gmail_users";
}
