use std::sync::Arc;

use clap::Parser;
use ponder_core::{CompletionClient, CompletionConfig, Database, EntryStore, PonderConfig};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use ponder_server::http::{self, HttpState};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "ponder.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match PonderConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Open the journal database eagerly so the schema migration runs at
    // startup, not on the first request.
    let database = Arc::new(Database::new(config.database.clone()));
    let pool = match database.acquire().await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to open journal database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match ponder_core::db::health_check(pool).await {
            Ok(v) => println!("✅ SQLite connected: {}", v),
            Err(e) => {
                println!("❌ SQLite check failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ Ponder DB health check passed");
        return Ok(());
    }

    let store = EntryStore::new(database);

    // Completion client is optional: without an API key the journal still
    // works, only the enrichment endpoints report failure.
    let completions =
        match CompletionClient::new(CompletionConfig::new(None, config.completion.clone())) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!("Completion endpoints disabled: {}", e);
                None
            }
        };

    // Shutdown signal
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = HttpState {
        store,
        completions,
        config,
    };
    http::start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
