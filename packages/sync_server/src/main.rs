use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use sync_server::config::{DataDir, FileConfig, ServerConfig, load_config};
use sync_server::db::Database;
use sync_server::{AppState, build_router};

#[derive(Parser)]
#[command(name = "syncsphere")]
#[command(about = "Real-time relay and conversation store for one-to-one chat")]
struct Cli {
    /// Custom data directory (defaults to ~/.syncsphere)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Port for the web server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Keep everything in memory; nothing survives a restart
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "syncsphere=debug,sync_server=debug,tower_http=debug,info"
    } else {
        "syncsphere=info,sync_server=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting SyncSphere relay");

    let data_dir = DataDir::new(cli.data_dir)?;
    let file_config: FileConfig = load_config(&data_dir.root)
        .extract()
        .with_context(|| {
            format!(
                "Failed to load configuration from {}",
                data_dir.config_toml_path().display()
            )
        })?;

    let mut server_config = ServerConfig::from_file(&file_config);
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    if let Some(host) = cli.host {
        server_config.host = host;
    }
    let addr = server_config.bind_addr()?;

    let db = if cli.ephemeral {
        info!("Ephemeral mode: using in-memory database");
        Database::in_memory().await?
    } else {
        Database::new(&data_dir).await?
    };

    info!(
        "Relay config: send_channel_capacity={}",
        server_config.relay.send_channel_capacity
    );

    let app_state = AppState::new(server_config, db);
    let app = build_router(app_state)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let actual_addr = listener.local_addr()?;

    info!("SyncSphere listening on http://{}", actual_addr);
    info!("API endpoints:");
    info!("  GET    /api/ws                        - Relay WebSocket");
    info!("  GET    /api/conversations             - List conversations");
    info!("  POST   /api/conversations             - Start or reopen a conversation");
    info!("  GET    /api/messages/:conversationId  - Message history");
    info!("  POST   /api/messages                  - Send a message");

    // Create shutdown signal handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, closing connections...");
    };

    // Run server with graceful shutdown
    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    info!("Shutdown complete");
    server_result
}
