//! API route handlers for the gateway.
//!
//! Handlers receive `SharedState` via Axum state extraction. Bodies and
//! query strings are checked before any token or Gmail call is made, so a
//! malformed request never touches the credential store.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use crate::api::SharedState;
use crate::error::{AuthError, GatewayError, Result, ValidationError};
use crate::gmail::client::{ListOptions, DEFAULT_MAX_RESULTS};
use crate::gmail::utils::OutgoingEmail;

// =============================================================================
// Router
// =============================================================================

pub fn gateway_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/health", get(health))
        .route("/health/store", get(health_store))
        // ── OAuth ────────────────────────────────────────────────────────
        .route("/auth/google", get(auth_url))
        .route("/auth/google/callback", get(auth_callback))
        .route("/auth/status", get(auth_status))
        // ── Gmail ────────────────────────────────────────────────────────
        .route("/api/listEmails", get(list_emails))
        .route("/api/readEmail/:message_id", get(read_email))
        .route("/api/sendEmail", post(send_email))
        .route("/api/replyEmail", post(reply_email))
        .route("/api/markAsRead", post(mark_as_read))
        .route("/api/deleteEmails", post(delete_emails))
        .route("/api/searchEmails", post(search_emails))
        .route("/api/naturalQuery", post(natural_query))
        // ── MCP bridge ───────────────────────────────────────────────────
        .route("/mcp/:session_id", get(mcp_descriptor))
        .route("/mcp/:session_id/:tool", post(mcp_invoke))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Endpoint not found",
        })),
    )
}

fn success(data: impl serde::Serialize) -> Result<Json<Value>> {
    Ok(Json(json!({
        "success": true,
        "data": serde_json::to_value(data)?,
    })))
}

/// Unwrap a JSON body and run its validation rules
fn checked_body<T: Validate>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    let Json(body) = body.map_err(|e| ValidationError::InvalidParameter {
        name: "body".to_string(),
        message: e.body_text(),
    })?;
    validate(&body)?;
    Ok(body)
}

fn checked_query<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    let Query(query) = query.map_err(|e| ValidationError::InvalidParameter {
        name: "query".to_string(),
        message: e.body_text(),
    })?;
    Ok(query)
}

/// Report the first failing field (alphabetically, for stable messages)
fn validate<T: Validate>(value: &T) -> Result<()> {
    let errors = match value.validate() {
        Ok(()) => return Ok(()),
        Err(errors) => errors,
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by_key(|(field, _)| *field);

    let error = match fields.first() {
        Some((field, errs)) if errs.iter().any(|e| e.code == "length") => {
            ValidationError::MissingField {
                field: field.to_string(),
            }
        }
        Some((field, _)) => ValidationError::InvalidParameter {
            name: field.to_string(),
            message: "has an invalid value".to_string(),
        },
        None => ValidationError::InvalidParameter {
            name: "body".to_string(),
            message: errors.to_string(),
        },
    };
    Err(error.into())
}

fn require(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            GatewayError::from(ValidationError::MissingField {
                field: field.to_string(),
            })
        })
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Health
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "Gmail MCP Gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_store(State(state): State<SharedState>) -> Result<Json<Value>> {
    state.tokens.store().ping().await?;
    success(json!({
        "backend": state.store_backend,
        "reachable": true,
    }))
}

// =============================================================================
// OAuth
// =============================================================================

#[derive(Deserialize)]
struct AuthUrlQuery {
    email: Option<String>,
}

/// GET /auth/google: consent URL for the tenant of `email` (or the default tenant)
async fn auth_url(
    State(state): State<SharedState>,
    query: std::result::Result<Query<AuthUrlQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let query = checked_query(query)?;
    let url = state.tokens.authorization_url(query.email.as_deref())?;

    Ok(Json(json!({
        "success": true,
        "authUrl": url,
        "message": "Open this URL to authorize Gmail access",
    })))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    email: Option<String>,
}

/// GET /auth/google/callback: exchange the code and store the user's tokens
async fn auth_callback(
    State(state): State<SharedState>,
    query: std::result::Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let query = checked_query(query)?;

    if let Some(error) = query.error {
        tracing::warn!("OAuth provider returned error: {}", error);
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": format!("OAuth error: {}", error),
            })),
        ));
    }

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": "Authorization code not provided",
            })),
        ));
    };

    let record = match state.tokens.exchange_code(&code, query.email.as_deref()).await {
        Ok(record) => record,
        Err(e @ GatewayError::Auth(AuthError::InvalidGrant)) => return Err(e),
        Err(e) => {
            tracing::error!("OAuth callback error: {}", e);
            return Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "error": "OAuth callback failed",
                    "details": e.to_string(),
                })),
            ));
        }
    };
    tracing::info!("Stored credentials for {}", record.email);

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "OAuth authorization succeeded",
            "user": {
                "email": record.email,
                "name": record.name,
                "picture": record.picture,
            },
        })),
    ))
}

#[derive(Deserialize)]
struct EmailQuery {
    email: Option<String>,
}

/// GET /auth/status: whether the user's stored credential is usable
async fn auth_status(
    State(state): State<SharedState>,
    query: std::result::Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let email = require(checked_query(query)?.email, "email")?;
    let credential = state.tokens.credential_state(&email).await?;
    success(json!({
        "email": email,
        "state": credential,
    }))
}

// =============================================================================
// Gmail
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEmailsQuery {
    email: Option<String>,
    #[serde(default)]
    query: String,
    max_results: Option<u32>,
    page_token: Option<String>,
}

async fn list_emails(
    State(state): State<SharedState>,
    query: std::result::Result<Query<ListEmailsQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let query = checked_query(query)?;
    let email = require(query.email, "email")?;

    let options = ListOptions {
        query: Some(query.query),
        max_results: query.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        page_token: query.page_token,
        include_spam_trash: false,
    };
    success(state.gmail.list_emails(&email, &options).await?)
}

async fn read_email(
    State(state): State<SharedState>,
    Path(message_id): Path<String>,
    query: std::result::Result<Query<EmailQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let email = require(checked_query(query)?.email, "email")?;
    success(state.gmail.read_email(&email, &message_id).await?)
}

#[derive(Deserialize, Validate)]
struct SendEmailBody {
    #[serde(default)]
    #[validate(length(min = 1), email)]
    email: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    to: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    subject: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    body: String,
    cc: Option<String>,
    bcc: Option<String>,
}

async fn send_email(
    State(state): State<SharedState>,
    body: std::result::Result<Json<SendEmailBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = checked_body(body)?;
    let outgoing = OutgoingEmail {
        to: body.to,
        cc: body.cc,
        bcc: body.bcc,
        subject: body.subject,
        body: body.body,
        in_reply_to: None,
    };

    let sent = state.gmail.send_email(&body.email, &outgoing).await?;
    Ok(Json(json!({
        "success": true,
        "data": sent,
        "message": "Email sent successfully",
    })))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ReplyEmailBody {
    #[serde(default)]
    #[validate(length(min = 1), email)]
    email: String,
    /// ID of the message being replied to
    #[serde(default)]
    #[validate(length(min = 1))]
    thread_id: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    subject: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    body: String,
}

async fn reply_email(
    State(state): State<SharedState>,
    body: std::result::Result<Json<ReplyEmailBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = checked_body(body)?;
    let sent = state
        .gmail
        .reply_email(&body.email, &body.thread_id, &body.subject, &body.body)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": sent,
        "message": "Reply sent successfully",
    })))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct MarkAsReadBody {
    #[serde(default)]
    #[validate(length(min = 1), email)]
    email: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    message_ids: Vec<String>,
    #[serde(default = "default_true")]
    read: bool,
}

async fn mark_as_read(
    State(state): State<SharedState>,
    body: std::result::Result<Json<MarkAsReadBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = checked_body(body)?;
    state
        .gmail
        .mark_as_read(&body.email, &body.message_ids, body.read)
        .await?;

    Ok(Json(json!({
        "success": true,
        "data": { "modified": body.message_ids.len() },
        "message": format!("Emails marked as {}", if body.read { "read" } else { "unread" }),
    })))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct DeleteEmailsBody {
    #[serde(default)]
    #[validate(length(min = 1), email)]
    email: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    message_ids: Vec<String>,
}

async fn delete_emails(
    State(state): State<SharedState>,
    body: std::result::Result<Json<DeleteEmailsBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = checked_body(body)?;
    state.gmail.delete_emails(&body.email, &body.message_ids).await?;

    Ok(Json(json!({
        "success": true,
        "data": { "deleted": body.message_ids.len() },
        "message": "Emails deleted successfully",
    })))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SearchEmailsBody {
    #[serde(default)]
    #[validate(length(min = 1), email)]
    email: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    query: String,
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 500))]
    max_results: u32,
    page_token: Option<String>,
}

async fn search_emails(
    State(state): State<SharedState>,
    body: std::result::Result<Json<SearchEmailsBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = checked_body(body)?;
    success(
        state
            .gmail
            .search_emails(&body.email, &body.query, body.max_results, body.page_token)
            .await?,
    )
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct NaturalQueryBody {
    #[serde(default)]
    #[validate(length(min = 1), email)]
    email: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    query: String,
    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 500))]
    max_results: u32,
}

async fn natural_query(
    State(state): State<SharedState>,
    body: std::result::Result<Json<NaturalQueryBody>, JsonRejection>,
) -> Result<Json<Value>> {
    let body = checked_body(body)?;
    success(
        state
            .gmail
            .search_emails(&body.email, &body.query, body.max_results, None)
            .await?,
    )
}

// =============================================================================
// MCP bridge
// =============================================================================

/// GET /mcp/:session_id: the tools this session can call over HTTP
async fn mcp_descriptor(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "message": "Gmail MCP Gateway is ready",
        "sessionId": session_id,
        "endpoints": state.tools.endpoints(&session_id),
        "usage": {
            "example": format!("POST /mcp/{}/list_emails", session_id),
            "body": {
                "email": "user@gmail.com",
                "maxResults": DEFAULT_MAX_RESULTS,
                "query": "",
            },
        },
    }))
}

/// POST /mcp/:session_id/:tool: run a tool with the body as its arguments
async fn mcp_invoke(
    State(state): State<SharedState>,
    Path((session_id, tool)): Path<(String, String)>,
    body: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(args) = body.map_err(|e| ValidationError::InvalidParameter {
        name: "body".to_string(),
        message: e.body_text(),
    })?;

    tracing::debug!("MCP session {} invoking {}", session_id, tool);
    success(state.tools.invoke(&tool, args).await?)
}
