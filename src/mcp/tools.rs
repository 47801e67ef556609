//! MCP Tool definitions and handlers
//!
//! Defines all available tools and their implementations. The same handler
//! serves the stdio MCP server and the HTTP tool bridge.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{McpError, Result};
use crate::gmail::client::{GmailService, ListOptions, DEFAULT_MAX_RESULTS};
use crate::gmail::utils::OutgoingEmail;
use crate::mcp::types::{CallToolResult, Tool};

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

/// Arguments of `list_emails`
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListEmailsArgs {
    /// Mailbox owner's email address
    pub email: String,

    /// Maximum number of results
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Gmail search query
    #[serde(default)]
    pub query: String,
}

/// Arguments of `natural_query`
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NaturalQueryArgs {
    /// Mailbox owner's email address
    pub email: String,

    /// Natural-language query
    pub query: String,

    /// Maximum number of results
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

/// Arguments of `read_email`
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadEmailArgs {
    /// Mailbox owner's email address
    pub email: String,

    /// Gmail message ID
    pub message_id: String,
}

/// Arguments of `send_email`
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailArgs {
    /// Sender's email address
    pub email: String,

    /// Recipient email address
    pub to: String,

    /// Subject line
    pub subject: String,

    /// HTML body
    pub body: String,
}

/// A tool as advertised on the HTTP bridge
#[derive(Debug, Clone, Serialize)]
pub struct ToolEndpoint {
    pub method: &'static str,
    pub url: String,
    pub description: String,
}

/// Tool handler
pub struct ToolHandler {
    gmail: Arc<GmailService>,
}

impl ToolHandler {
    /// Create a new tool handler
    pub fn new(gmail: Arc<GmailService>) -> Self {
        Self { gmail }
    }

    /// List all available tools
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool_def::<ListEmailsArgs>("list_emails", "List Gmail messages"),
            tool_def::<NaturalQueryArgs>("natural_query", "Query Gmail in natural language"),
            tool_def::<ReadEmailArgs>("read_email", "Read the content of a specific email"),
            tool_def::<SendEmailArgs>("send_email", "Send an email"),
        ]
    }

    /// Call a tool by name, reporting failures as tool-level errors
    pub async fn call_tool(&self, name: &str, args: Value) -> CallToolResult {
        match self.invoke(name, args).await {
            Ok(value) => match serde_json::to_string_pretty(&value) {
                Ok(text) => CallToolResult::text(text),
                Err(e) => CallToolResult::error(e.to_string()),
            },
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                CallToolResult::error(e.to_string())
            }
        }
    }

    /// Run a tool and return its raw JSON result
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        match name {
            "list_emails" => self.handle_list_emails(parse_args(args)?).await,
            "natural_query" => self.handle_natural_query(parse_args(args)?).await,
            "read_email" => self.handle_read_email(parse_args(args)?).await,
            "send_email" => self.handle_send_email(parse_args(args)?).await,
            _ => Err(McpError::UnknownTool {
                name: name.to_string(),
            }
            .into()),
        }
    }

    /// Tool endpoints for an HTTP session
    pub fn endpoints(&self, session_id: &str) -> Value {
        let endpoints: serde_json::Map<String, Value> = self
            .list_tools()
            .into_iter()
            .map(|tool| {
                let endpoint = ToolEndpoint {
                    method: "POST",
                    url: format!("/mcp/{}/{}", session_id, tool.name),
                    description: tool.description.unwrap_or_default(),
                };
                (tool.name, json!(endpoint))
            })
            .collect();
        Value::Object(endpoints)
    }

    // ==================== Tool Handlers ====================

    async fn handle_list_emails(&self, args: ListEmailsArgs) -> Result<Value> {
        let options = ListOptions {
            query: Some(args.query),
            max_results: args.max_results,
            ..Default::default()
        };
        let result = self.gmail.list_emails(&args.email, &options).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_natural_query(&self, args: NaturalQueryArgs) -> Result<Value> {
        let result = self
            .gmail
            .search_emails(&args.email, &args.query, args.max_results, None)
            .await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_read_email(&self, args: ReadEmailArgs) -> Result<Value> {
        let result = self.gmail.read_email(&args.email, &args.message_id).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_send_email(&self, args: SendEmailArgs) -> Result<Value> {
        let outgoing = OutgoingEmail {
            to: args.to,
            subject: args.subject,
            body: args.body,
            ..Default::default()
        };
        let result = self.gmail.send_email(&args.email, &outgoing).await?;
        Ok(serde_json::to_value(result)?)
    }
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| {
        McpError::InvalidArguments {
            message: e.to_string(),
        }
        .into()
    })
}

/// Helper to create a tool definition with a schema derived from its arguments
fn tool_def<T: JsonSchema>(name: &str, description: &str) -> Tool {
    let schema = schemars::schema_for!(T);
    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"})),
    }
}
