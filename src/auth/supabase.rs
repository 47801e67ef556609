//! Supabase-backed credential store
//!
//! Talks to the PostgREST endpoint of a Supabase project. The `gmail_users`
//! table must have a unique constraint on `email`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::auth::store::{CredentialStore, TokenUpdate, UserCredentialRecord};
use crate::config::store::USERS_TABLE;
use crate::error::{AuthError, GatewayError, Result};

/// Credential store persisted in a Supabase table
pub struct SupabaseStore {
    http_client: reqwest::Client,
    table_url: String,
    api_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            table_url: format!("{}/rest/v1/{}", base_url.trim_end_matches('/'), USERS_TABLE),
            api_key: api_key.to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, query: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}?{}", self.table_url, query))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn rows(response: Response, operation: &str) -> Result<Vec<UserCredentialRecord>> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await.map_err(|e| store_error(e, operation))?);
        }

        let text = response.text().await.unwrap_or_default();
        Err(AuthError::Store {
            message: format!("{} failed ({}): {}", operation, status, text),
        }
        .into())
    }
}

fn eq_filter(email: &str) -> String {
    format!("email=eq.{}", urlencoding::encode(email))
}

fn store_error(err: reqwest::Error, operation: &str) -> GatewayError {
    if err.is_timeout() {
        AuthError::Transient {
            operation: format!("credential store {}", operation),
        }
        .into()
    } else {
        AuthError::Store {
            message: format!("{}: {}", operation, err),
        }
        .into()
    }
}

#[async_trait]
impl CredentialStore for SupabaseStore {
    async fn upsert(&self, record: &UserCredentialRecord) -> Result<UserCredentialRecord> {
        tracing::debug!("Storing user data to Supabase: {}", record.email);

        let response = self
            .request(reqwest::Method::POST, "on_conflict=email")
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[record])
            .send()
            .await
            .map_err(|e| store_error(e, "upsert"))?;

        let mut rows = Self::rows(response, "upsert").await?;
        if rows.is_empty() {
            // Some deployments disable representation on upsert.
            return Ok(record.clone());
        }
        Ok(rows.swap_remove(0))
    }

    async fn find(&self, email: &str) -> Result<Option<UserCredentialRecord>> {
        let response = self
            .request(reqwest::Method::GET, &format!("{}&select=*", eq_filter(email)))
            .send()
            .await
            .map_err(|e| store_error(e, "select"))?;

        Ok(Self::rows(response, "select").await?.into_iter().next())
    }

    async fn update_tokens(&self, email: &str, update: &TokenUpdate) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, &eq_filter(email))
            .header("Prefer", "return=representation")
            .json(update)
            .send()
            .await
            .map_err(|e| store_error(e, "update"))?;

        if Self::rows(response, "update").await?.is_empty() {
            return Err(AuthError::NotFound {
                email: email.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let response = self
            .request(reqwest::Method::GET, "select=email&limit=1")
            .send()
            .await
            .map_err(|e| store_error(e, "ping"))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::Store {
                message: "Supabase rejected the API key".to_string(),
            }
            .into()),
            status => Err(AuthError::Store {
                message: format!("ping failed ({})", status),
            }
            .into()),
        }
    }
}
