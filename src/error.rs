//! Error types for the Gmail MCP Gateway
//!
//! This module defines the error hierarchy for all operations in the gateway
//! and how each error is reported over HTTP.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the Gmail MCP Gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// OAuth and credential errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Gmail API errors
    #[error("Gmail API error: {0}")]
    Gmail(#[from] GmailApiError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// MCP protocol errors
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// OAuth token lifecycle errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// No tenant (not even the default) has OAuth client credentials.
    #[error("OAuth client credentials missing for tenant '{tenant}'")]
    ConfigMissing { tenant: String },

    /// The authorization code was already used or has expired.
    #[error("Authorization code is invalid or expired, restart the authorization flow")]
    InvalidGrant,

    #[error("No refresh token stored for {email}, re-authorize with consent")]
    NoRefreshToken { email: String },

    #[error("No credentials stored for {email}")]
    NotFound { email: String },

    #[error("OAuth provider error: {message}")]
    Provider { message: String },

    #[error("Credential store error: {message}")]
    Store { message: String },

    /// A provider or store call timed out; the caller may retry.
    #[error("Timed out waiting for {operation}")]
    Transient { operation: String },
}

/// Gmail API errors
#[derive(Error, Debug)]
pub enum GmailApiError {
    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("API request failed: {message}")]
    RequestFailed { message: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidEnvVar { var: String, message: String },
}

/// Validation errors
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid email address: {email}")]
    InvalidEmail { email: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },
}

/// MCP protocol errors
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Invalid tool arguments: {message}")]
    InvalidArguments { message: String },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Mcp(McpError::UnknownTool { .. }) => StatusCode::NOT_FOUND,
            GatewayError::Mcp(_) => StatusCode::BAD_REQUEST,
            GatewayError::Auth(err) => match err {
                AuthError::InvalidGrant => StatusCode::BAD_REQUEST,
                AuthError::NoRefreshToken { .. } => StatusCode::UNAUTHORIZED,
                AuthError::NotFound { .. } => StatusCode::NOT_FOUND,
                AuthError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Provider { .. } => StatusCode::BAD_GATEWAY,
                AuthError::ConfigMissing { .. } | AuthError::Store { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            GatewayError::Gmail(GmailApiError::MessageNotFound { .. }) => StatusCode::NOT_FOUND,
            GatewayError::Gmail(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Auth(AuthError::Transient { .. }))
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = json!({
            "success": false,
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::NotFound {
            email: "user@gmail.com".to_string(),
        };
        assert!(err.to_string().contains("user@gmail.com"));
    }

    #[test]
    fn test_error_conversion() {
        let auth_err = AuthError::InvalidGrant;
        let err: GatewayError = auth_err.into();
        assert!(matches!(err, GatewayError::Auth(AuthError::InvalidGrant)));
    }

    #[test]
    fn test_status_mapping() {
        let invalid_grant: GatewayError = AuthError::InvalidGrant.into();
        assert_eq!(invalid_grant.status_code(), StatusCode::BAD_REQUEST);

        let missing: GatewayError = AuthError::NotFound {
            email: "a@b.com".to_string(),
        }
        .into();
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let store: GatewayError = AuthError::Store {
            message: "down".to_string(),
        }
        .into();
        assert_eq!(store.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        let timeout: GatewayError = AuthError::Transient {
            operation: "token refresh".to_string(),
        }
        .into();
        assert!(timeout.is_retryable());

        let provider: GatewayError = AuthError::Provider {
            message: "boom".to_string(),
        }
        .into();
        assert!(!provider.is_retryable());
    }
}
