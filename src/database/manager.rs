use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;

/// Errors from pool setup and migrations
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Migration {version} ({description}) failed: {source}")]
    Migration {
        version: i64,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Opens the Postgres pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let url = config
        .url
        .as_deref()
        .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
    let shown = redact(url)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(url)
        .await?;

    info!(
        database = %shown,
        max_connections = config.max_connections,
        "Connected to database"
    );
    Ok(pool)
}

/// Connection string with the password removed, safe for logs.
fn redact(url: &str) -> Result<String, DatabaseError> {
    let mut parsed = url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        return Err(DatabaseError::InvalidDatabaseUrl);
    }
    if parsed.password().is_some() {
        // Only fails for cannot-be-a-base URLs, which the scheme check excludes.
        let _ = parsed.set_password(Some("***"));
    }
    Ok(parsed.into())
}

/// Closes the pool, waiting for checked-out connections to return.
pub async fn close(pool: PgPool) {
    pool.close().await;
    info!("Closed database pool");
}
