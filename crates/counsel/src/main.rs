//! Counsel daemon - legal consultation API server

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use counsel::config::Config;
use counsel::error::Result;
use counsel::relay::RelayClient;
use counsel::server::{ApiServer, AppState};
use counsel::storage::Store;

/// Counsel - legal consultation backend with a streaming AI relay
#[derive(Parser)]
#[command(name = "counsel")]
#[command(about = "Legal consultation API server")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the API server (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,counsel=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let candidates = match config_path {
        Some(path) => vec![Some(path)],
        None => vec![
            dirs::home_dir().map(|h| h.join(".counsel").join("config.toml")),
            dirs::config_dir().map(|c| c.join("counsel").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ],
    };

    for path in candidates.into_iter().flatten() {
        if !path.exists() {
            continue;
        }
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            counsel::CounselError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| counsel::CounselError::Config(format!("Failed to parse config: {e}")))?;
        return Ok(config);
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Counsel daemon");

    let config = load_config(config_path)?;

    let data_dir = &config.storage.data_dir;
    std::fs::create_dir_all(data_dir).map_err(|e| {
        counsel::CounselError::Database(format!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    let db_path = config.storage.db_path();
    tracing::info!("Opening database at: {}", db_path.display());
    let store = Store::open(&db_path)?;

    let relay = RelayClient::new(&config.relay)?;
    if relay.has_credential() {
        tracing::info!("Upstream AI credential configured");
    } else {
        tracing::warn!(
            "No upstream AI credential configured; /ai/chat degrades to a fixed mock response"
        );
    }

    let state = Arc::new(AppState {
        config,
        store,
        relay,
    });

    let server = ApiServer::new(state);
    server.serve().await?;

    tracing::info!("Counsel daemon stopped");
    Ok(())
}
