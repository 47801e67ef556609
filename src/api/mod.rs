//! HTTP API for the gateway.
//!
//! Mounts the endpoint groups:
//! - /health        health and store checks
//! - /auth          OAuth consent, callback and credential status
//! - /api           Gmail operations on behalf of an authorized user
//! - /mcp           HTTP bridge to the MCP tools
//!
//! Every response uses the `{success, data|error}` envelope.

pub mod routes;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::TokenManager;
use crate::gmail::GmailService;
use crate::mcp::tools::ToolHandler;

/// Services shared by every request handler
pub struct AppState {
    pub tokens: Arc<TokenManager>,
    pub gmail: Arc<GmailService>,
    pub tools: Arc<ToolHandler>,
    /// Name of the credential backend, reported by the store health check
    pub store_backend: &'static str,
}

impl AppState {
    /// Wire the Gmail facade and tool handler on top of a token manager
    pub fn new(tokens: Arc<TokenManager>, gmail: Arc<GmailService>, store_backend: &'static str) -> Self {
        let tools = Arc::new(ToolHandler::new(gmail.clone()));
        Self {
            tokens,
            gmail,
            tools,
            store_backend,
        }
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::gateway_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
