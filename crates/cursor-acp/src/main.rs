//! Cursor ACP bridge.
//!
//! Run with: cargo run -p cursor-acp
//!
//! Loads the session store, starts the local proxy and prints its base URL,
//! then serves until Ctrl-C.

mod config;
mod logging;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cursor_acp_core::SessionId;
use cursor_acp_proxy::ProxyServer;
use cursor_acp_session::{SessionManager, storage::FileStorage};

use crate::config::{AppConfig, Overrides};

#[derive(Debug, Parser)]
#[command(name = "cursor-acp", version, about)]
struct Cli {
    /// Path to config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding session records.
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the local proxy and serve until interrupted (default).
    Serve {
        /// Host to bind.
        #[arg(long)]
        host: Option<String>,
        /// Port to bind; 0 discovers one.
        #[arg(long)]
        port: Option<u16>,
        /// Health-check route.
        #[arg(long)]
        health_path: Option<String>,
    },
    /// Inspect or prune stored sessions.
    #[command(subcommand)]
    Sessions(SessionsCommand),
}

#[derive(Debug, Subcommand)]
enum SessionsCommand {
    /// Print all sessions as JSON, newest first.
    List,
    /// Delete a session.
    Delete { id: SessionId },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let mut config = match cli.config.clone().or_else(AppConfig::default_path) {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };

    let mut overrides = Overrides {
        sessions_dir: cli.sessions_dir,
        ..Overrides::default()
    };
    let command = cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
        health_path: None,
    });
    if let Command::Serve {
        host,
        port,
        health_path,
    } = &command
    {
        overrides.host.clone_from(host);
        overrides.port = *port;
        overrides.health_path.clone_from(health_path);
    }
    config.apply(overrides);

    let sessions_dir = config.sessions_dir();
    let sessions = SessionManager::new(FileStorage::new(&sessions_dir));
    sessions
        .initialize()
        .await
        .with_context(|| format!("Failed to load sessions from {}", sessions_dir.display()))?;

    match command {
        Command::Serve { .. } => serve(&config).await,
        Command::Sessions(SessionsCommand::List) => {
            let list = sessions.list_sessions().await;
            println!("{}", serde_json::to_string_pretty(&list)?);
            Ok(())
        }
        Command::Sessions(SessionsCommand::Delete { id }) => {
            sessions
                .delete_session(id)
                .await
                .with_context(|| format!("Failed to delete session {id}"))?;
            Ok(())
        }
    }
}

async fn serve(config: &AppConfig) -> Result<()> {
    let proxy = ProxyServer::new(config.proxy.clone()).context("Invalid proxy config")?;
    let base_url = proxy.start().await.context("Failed to start proxy")?;
    println!("{base_url}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    proxy.stop().await;
    Ok(())
}
