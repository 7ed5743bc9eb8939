//! Toolweave CLI — entry point.
//!
//! # Commands
//!
//! - `toolweave chat [-m MESSAGE] [-s SESSION] [--stream]` — chat (single-shot or REPL)
//! - `toolweave tools` — list the merged tool catalog
//! - `toolweave sessions list|show|delete` — inspect persisted sessions
//! - `toolweave status` — show configuration, provider and server status

mod helpers;
mod repl;
mod sessions_cmd;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use toolweave_agent::{SessionStore, ToolRegistry};
use toolweave_core::config::{load_config, Config};
use toolweave_core::utils::truncate_string;
use toolweave_providers::create_provider;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Toolweave: a tool-using chat agent over MCP tool servers
#[derive(Parser)]
#[command(name = "toolweave", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session id to resume. A new one is generated when omitted.
        #[arg(short, long)]
        session: Option<String>,

        /// Stream plain replies as they are generated (no tool calls)
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// List the tools exposed by all configured servers
    Tools {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Inspect or delete persisted sessions
    Sessions {
        #[command(subcommand)]
        action: sessions_cmd::SessionsCommands,
    },

    /// Show configuration, provider and server status
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            session,
            stream,
            logs,
        } => {
            init_logging(logs);
            run_chat(message, session, stream).await
        }
        Commands::Tools { logs } => {
            init_logging(logs);
            run_tools().await
        }
        Commands::Sessions { action } => {
            init_logging(false);
            sessions_cmd::dispatch(action).await
        }
        Commands::Status => status::run(),
    }
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(message: Option<String>, session: Option<String>, stream: bool) -> Result<()> {
    let config = load_config(None);
    let store = build_session_store(&config, !stream).await?;
    let (session_id, handle) = store.new_or_resume(session.as_deref()).await;

    match message {
        Some(msg) if stream => {
            info!(session = %session_id, "streaming single message");
            helpers::run_stream_turn(&handle, &msg).await;
            helpers::print_session_hint(&session_id);
        }
        Some(msg) => {
            info!(session = %session_id, "processing single message");
            helpers::print_thinking();
            let outcome = helpers::run_turn(&handle, &msg).await;
            helpers::clear_thinking();
            helpers::print_outcome(&outcome);
            helpers::print_session_hint(&session_id);
        }
        None => repl::run(handle, stream).await?,
    }

    Ok(())
}

/// Build the tool registry with its catalog loaded.
pub async fn build_registry(config: &Config) -> Result<ToolRegistry> {
    let registry =
        ToolRegistry::from_configs(&config.servers).context("invalid tool server configuration")?;
    registry
        .refresh_with_retry(config.catalog.retries, config.catalog.retry_delay())
        .await;
    Ok(registry)
}

/// Build a `SessionStore` from the loaded configuration.
///
/// Without `with_tools` no server is started (streamed chat offers none).
pub async fn build_session_store(config: &Config, with_tools: bool) -> Result<SessionStore> {
    let providers_map = config.providers.to_map();
    let provider = create_provider(&config.agent.model, &providers_map)
        .context("failed to create model provider")?;

    let registry = if with_tools {
        build_registry(config).await?
    } else {
        ToolRegistry::new()
    };

    Ok(SessionStore::from_config(
        config,
        Arc::new(provider),
        Arc::new(registry),
    ))
}

// ─────────────────────────────────────────────
// Tools command
// ─────────────────────────────────────────────

async fn run_tools() -> Result<()> {
    let config = load_config(None);
    let registry = build_registry(&config).await?;
    let tools = registry.cached_tools().await;

    if tools.is_empty() {
        println!("No tools available from {} server(s).", registry.len());
        return Ok(());
    }

    println!();
    for (qualified, descriptor) in &tools {
        let description = descriptor.description.lines().next().unwrap_or("");
        println!("  {:<32} {}", qualified, truncate_string(description, 72));
    }
    println!();
    println!("{} tool(s) from {} server(s)", tools.len(), registry.len());
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("toolweave=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
