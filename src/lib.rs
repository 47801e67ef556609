//! Gmail MCP Gateway Library
//!
//! A multi-tenant OAuth2 and Gmail gateway. Users authorize once through
//! Google; their tokens are kept in a credential store and refreshed on
//! demand. Gmail operations are exposed as a REST API and as Model Context
//! Protocol (MCP) tools.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gmail;
pub mod mcp;

pub use config::Config;
pub use error::{GatewayError, Result};
