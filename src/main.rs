use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeclock_api::config::{AppConfig, StoreBackend};
use timeclock_api::database::{self, migrations};
use timeclock_api::middleware::AuthGate;
use timeclock_api::server;
use timeclock_api::store::{MemoryStore, PgStore, SharedStore};
use timeclock_api::AppState;

#[derive(Parser)]
#[command(name = "timeclock-api")]
#[command(about = "Time-and-attendance kiosk backend")]
#[command(version)]
struct Cli {
    #[arg(long, global = true, help = "Bind host (overrides HOST)")]
    host: Option<String>,

    #[arg(long, global = true, help = "Bind port (overrides PORT)")]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the HTTP API (default)")]
    Serve,

    #[command(about = "Apply pending Postgres migrations and exit")]
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so local runs pick up DATABASE_URL, API_TOKEN, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!(
        "Starting timeclock-api v{} in {:?} mode",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(config).await,
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let (store, pool) = open_store(&config).await?;

    let report = database::bootstrap(store.as_ref(), config.database.seed_sample_data)
        .await
        .context("failed to seed initial data")?;
    if report.settings_created {
        tracing::info!("Created default settings record");
    }

    let auth = AuthGate::new(config.security.api_token.as_deref());
    if auth.is_open() {
        tracing::warn!("API_TOKEN is not set: any bearer token will be accepted");
    }

    let state = AppState::new(store, auth, config.sync.max_batch);
    let app = server::router(state, &config.security);
    let served = server::serve(&config.server, app).await;

    if let Some(pool) = pool {
        database::close(pool).await;
    }
    served
}

async fn migrate(config: AppConfig) -> Result<()> {
    let pool = database::connect(&config.database)
        .await
        .context("failed to connect to Postgres")?;
    let applied = migrations::run(&pool).await.context("migration failed")?;
    tracing::info!(applied, "Migrations complete");
    database::close(pool).await;
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<(SharedStore, Option<PgPool>)> {
    match config.database.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store; data is lost on restart");
            Ok((Arc::new(MemoryStore::new()), None))
        }
        StoreBackend::Postgres => {
            let pool = database::connect(&config.database)
                .await
                .context("failed to connect to Postgres")?;
            migrations::run(&pool).await.context("migration failed")?;
            Ok((Arc::new(PgStore::new(pool.clone())), Some(pool)))
        }
    }
}
