use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::ContentDb;
use common::cli::{CommonArgs, CommonCommands, ServerArgs, utils};
use common::clock::SystemClock;
use common::config::Configuration;
use router::{AppState, RouterState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "isynergies")]
#[command(about = "iSynergies admin media service: blob reconciliation, media sweep and draft autosave")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Option<IsynergiesCommands>,
}

#[derive(Subcommand)]
enum IsynergiesCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for IsynergiesCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    utils::apply_server_args(&mut config, &cli.server);

    // Handle common commands that don't require starting the service
    let command = cli.command.unwrap_or_default();
    let IsynergiesCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config).await? {
        return Ok(());
    }

    utils::validate_config(&config)?;

    log::info!("Loaded configuration:");
    log::info!("  Environment: {:?}", config.server.environment);
    log::info!("  Database DSN: {}", config.database.dsn);
    log::info!("  Storage DSN: {}", config.storage.dsn);

    ensure_sqlite_dir(&config)?;
    let db = ContentDb::new(&config.database.dsn)
        .await
        .context("Failed to open content database")?;

    let backend = common::storage::create_blob_backend(&config.storage)
        .context("Failed to initialize blob storage")?;

    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .context("Invalid server bind address")?;

    let state = AppState::new(config, db, backend, Arc::new(SystemClock));
    let drafts = state.drafts().clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;
    log::info!("HTTP server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Persist drafts still waiting for their debounce timer
    let flushed = drafts.flush().await;
    log::info!("Flushed {flushed} pending drafts, shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}

/// SQLite creates the database file but not its parent directory.
fn ensure_sqlite_dir(config: &Configuration) -> Result<()> {
    let Some(path) = config.database.dsn.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }
    Ok(())
}
