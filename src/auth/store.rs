//! Credential persistence
//!
//! The store is the single source of truth for per-user tokens. Records are
//! keyed by email; the gateway inserts or overwrites them after an OAuth
//! callback and patches the access token after a refresh. It never deletes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AuthError, Result};

/// Tokens and identity stored for one authorized user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentialRecord {
    /// Unique key
    pub email: String,

    /// Display name
    pub name: String,

    /// Avatar URL
    #[serde(default)]
    pub picture: Option<String>,

    pub access_token: String,

    /// Absent when the user re-authorized without a consent prompt. Never
    /// serialized as null, so an upsert keeps the stored value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access token expiry (Unix epoch milliseconds)
    pub expiry_date: i64,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Fields rewritten by a token refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUpdate {
    pub access_token: String,
    pub expiry_date: i64,
}

/// Persistent table of credential records keyed by email
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert the record, or overwrite the existing row with the same email.
    /// A record without a refresh token keeps the one already stored.
    async fn upsert(&self, record: &UserCredentialRecord) -> Result<UserCredentialRecord>;

    /// Look up the record for `email`.
    async fn find(&self, email: &str) -> Result<Option<UserCredentialRecord>>;

    /// Patch only the access token and expiry of an existing record.
    async fn update_tokens(&self, email: &str, update: &TokenUpdate) -> Result<()>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process store used for development and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, UserCredentialRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn upsert(&self, record: &UserCredentialRecord) -> Result<UserCredentialRecord> {
        let mut records = self.records.write().await;
        let mut stored = record.clone();
        if stored.refresh_token.is_none() {
            stored.refresh_token = records
                .get(&record.email)
                .and_then(|existing| existing.refresh_token.clone());
        }
        records.insert(stored.email.clone(), stored.clone());
        Ok(stored)
    }

    async fn find(&self, email: &str) -> Result<Option<UserCredentialRecord>> {
        Ok(self.records.read().await.get(email).cloned())
    }

    async fn update_tokens(&self, email: &str, update: &TokenUpdate) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records.get_mut(email).ok_or_else(|| AuthError::NotFound {
            email: email.to_string(),
        })?;
        record.access_token = update.access_token.clone();
        record.expiry_date = update.expiry_date;
        Ok(())
    }
}
