//! survey-intake - Survey submission intake service
//!
//! Loads bootstrap configuration, opens the append-only store and serves
//! `POST /v1/survey` and `GET /ping` until Ctrl+C or SIGTERM.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use survey_common::config::{
    ensure_directory_exists, ConfigOverrides, ConfigSource, LoggingConfig, ServiceConfig,
};
use survey_intake::api::BuildInfo;
use survey_intake::{build_router, AppState, JsonlStore};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for survey-intake
#[derive(Parser, Debug)]
#[command(name = "survey-intake")]
#[command(about = "Survey submission intake service")]
#[command(version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "SURVEY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "SURVEY_PORT")]
    port: Option<u16>,

    /// Folder holding the submission store
    #[arg(short, long)]
    data_folder: Option<PathBuf>,

    /// Submission store file (relative paths resolve under the data folder)
    #[arg(short, long, env = "SURVEY_STORE")]
    store: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ServiceConfig::load(ConfigOverrides {
        config_path: args.config,
        data_folder: args.data_folder,
        store_path: args.store,
        port: args.port,
        log_level: args.log_level,
    })
    .context("Failed to load configuration")?;

    init_tracing(&config.logging)?;

    // Build identification first, before any slower startup work
    info!("Starting survey-intake {}", BuildInfo::current());

    match &config.source {
        ConfigSource::File(path) => info!("Loaded TOML configuration from {}", path.display()),
        ConfigSource::Missing(path) => {
            warn!("Config file {} not found, using built-in defaults", path.display())
        }
        ConfigSource::Builtin => {
            warn!("No config file location available, using built-in defaults")
        }
    }
    info!("Data folder: {}", config.data_folder.display());
    info!("Store: {}", config.store_path.display());
    info!(
        append_timeout_ms = config.append_timeout.as_millis() as u64,
        max_body_bytes = config.max_body_bytes,
        cors_allow_any_origin = config.cors_allow_any_origin,
        "HTTP settings"
    );

    ensure_directory_exists(&config.data_folder)
        .with_context(|| format!("Failed to create data folder {}", config.data_folder.display()))?;

    let store = match JsonlStore::open(&config.store_path, config.append_timeout) {
        Ok(store) => {
            info!("✓ Opened submission store");
            store
        }
        Err(e) => {
            error!("Failed to open submission store: {}", e);
            return Err(e.into());
        }
    };

    let state = AppState::from_config(store, &config);
    let app = build_router(state);

    let listen_addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", listen_addr))?;
    info!("survey-intake listening on http://{}", listen_addr);
    info!("Ping: http://{}/ping", listen_addr);

    // Connect info exposes the socket peer address to handlers
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the global subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "survey_intake={level},survey_common={level},tower_http={level}",
            level = logging.level
        ))
    });

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
