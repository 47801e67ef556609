//! Gmail MCP Gateway
//!
//! Runs the HTTP gateway (default), the MCP server on stdio, or prints an
//! OAuth consent URL.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use gmail_mcp_gateway::api::{self, AppState};
use gmail_mcp_gateway::auth::{
    CredentialStore, GoogleProvider, MemoryStore, SupabaseStore, TokenManager,
};
use gmail_mcp_gateway::config::Config;
use gmail_mcp_gateway::gmail::GmailService;
use gmail_mcp_gateway::mcp::server::McpServer;
use gmail_mcp_gateway::mcp::tools::ToolHandler;

/// Gmail MCP Gateway
#[derive(Parser)]
#[command(name = "gmail-mcp-gateway")]
#[command(author, version, about = "Multi-tenant Gmail gateway with REST and MCP interfaces")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve,

    /// Serve the MCP tools over stdio
    Mcp,

    /// Print the OAuth consent URL and open it in a browser
    AuthUrl {
        /// Pick the tenant this address belongs to
        #[arg(long)]
        email: Option<String>,

        /// Only print the URL
        #[arg(long)]
        no_open: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout carries MCP traffic
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gmail_mcp_gateway=info,tower_http=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Mcp => {
            let (_, gmail, _) = build_services(&config)?;
            let mut server = McpServer::new(Arc::new(ToolHandler::new(gmail)));
            server.run_stdio().await?;
            Ok(())
        }
        Commands::AuthUrl { email, no_open } => {
            let (tokens, _, _) = build_services(&config)?;
            let url = tokens.authorization_url(email.as_deref())?;
            println!("{}", url);
            if !no_open {
                if let Err(e) = open::that(&url) {
                    tracing::warn!("Could not open browser: {}", e);
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    info!("gmail-mcp-gateway v{}", env!("CARGO_PKG_VERSION"));

    let (tokens, gmail, backend) = build_services(&config)?;
    let state = Arc::new(AppState::new(tokens, gmail, backend));
    let app = api::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);
    info!("OAuth redirect URI: {}", config.redirect_uri);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Wire store, provider, token manager and Gmail facade from configuration
fn build_services(
    config: &Config,
) -> anyhow::Result<(Arc<TokenManager>, Arc<GmailService>, &'static str)> {
    let (store, backend): (Arc<dyn CredentialStore>, &'static str) =
        match (&config.supabase_url, &config.supabase_key) {
            (Some(url), Some(key)) => {
                info!("Using Supabase credential store at {}", url);
                (Arc::new(SupabaseStore::new(url, key, config.http_timeout)?), "supabase")
            }
            _ => {
                tracing::warn!(
                    "SUPABASE_URL / SUPABASE_ANON_KEY not set, credentials are kept in memory and lost on restart"
                );
                (Arc::new(MemoryStore::new()), "memory")
            }
        };

    let provider = Arc::new(GoogleProvider::new(config.http_timeout)?);
    let tokens = Arc::new(TokenManager::from_config(config, store, provider));
    let gmail = Arc::new(GmailService::new(tokens.clone(), config.http_timeout)?);

    Ok((tokens, gmail, backend))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
}
