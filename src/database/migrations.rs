//! Ordered schema migrations, applied once each at startup.
//!
//! Every statement is written to be idempotent so a half-recorded run can be
//! replayed safely; `schema_migrations` records which versions are done.

use std::collections::HashSet;

use sqlx::PgPool;
use tracing::info;

use super::manager::DatabaseError;

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "base tables",
        statements: &[
            "CREATE TABLE IF NOT EXISTS employees (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                pin TEXT,
                image_url TEXT,
                archived BOOLEAN NOT NULL DEFAULT FALSE,
                auto_deduct_lunch BOOLEAN NOT NULL DEFAULT FALSE,
                location_id TEXT,
                department_id TEXT
            )",
            "CREATE TABLE IF NOT EXISTS time_records (
                id TEXT PRIMARY KEY,
                employee_id TEXT NOT NULL,
                location_id TEXT,
                clock_in TIMESTAMPTZ NOT NULL,
                clock_out TIMESTAMPTZ,
                breaks JSONB NOT NULL DEFAULT '[]'::jsonb
            )",
            "CREATE TABLE IF NOT EXISTS locations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                abbreviation TEXT
            )",
            "CREATE TABLE IF NOT EXISTS departments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS settings (
                id TEXT PRIMARY KEY,
                logo_url TEXT,
                week_start_day INTEGER NOT NULL DEFAULT 0,
                remote_db_url TEXT
            )",
        ],
    },
    Migration {
        version: 2,
        description: "employee temp agency columns",
        statements: &[
            "ALTER TABLE employees ADD COLUMN IF NOT EXISTS is_temp BOOLEAN NOT NULL DEFAULT FALSE",
            "ALTER TABLE employees ADD COLUMN IF NOT EXISTS temp_agency TEXT",
        ],
    },
    Migration {
        version: 3,
        description: "kiosk behaviour settings",
        statements: &[
            "ALTER TABLE settings ADD COLUMN IF NOT EXISTS screen_saver_enabled BOOLEAN NOT NULL DEFAULT FALSE",
            "ALTER TABLE settings ADD COLUMN IF NOT EXISTS clock_format TEXT",
            "ALTER TABLE settings ADD COLUMN IF NOT EXISTS screen_saver_timeout INTEGER",
            "ALTER TABLE settings ADD COLUMN IF NOT EXISTS clock_in_screen_timeout INTEGER",
            "ALTER TABLE settings ADD COLUMN IF NOT EXISTS admin_screen_timeout INTEGER",
            "CREATE INDEX IF NOT EXISTS time_records_employee_id_idx ON time_records (employee_id)",
        ],
    },
    Migration {
        version: 4,
        description: "write sequence and tombstones",
        statements: &[
            "CREATE SEQUENCE IF NOT EXISTS record_write_seq",
            "ALTER TABLE employees ADD COLUMN IF NOT EXISTS _seq BIGINT NOT NULL DEFAULT nextval('record_write_seq')",
            "ALTER TABLE time_records ADD COLUMN IF NOT EXISTS _seq BIGINT NOT NULL DEFAULT nextval('record_write_seq')",
            "ALTER TABLE locations ADD COLUMN IF NOT EXISTS _seq BIGINT NOT NULL DEFAULT nextval('record_write_seq')",
            "ALTER TABLE departments ADD COLUMN IF NOT EXISTS _seq BIGINT NOT NULL DEFAULT nextval('record_write_seq')",
            "ALTER TABLE settings ADD COLUMN IF NOT EXISTS _seq BIGINT NOT NULL DEFAULT nextval('record_write_seq')",
            "CREATE INDEX IF NOT EXISTS employees_seq_idx ON employees (_seq)",
            "CREATE INDEX IF NOT EXISTS time_records_seq_idx ON time_records (_seq)",
            "CREATE INDEX IF NOT EXISTS locations_seq_idx ON locations (_seq)",
            "CREATE INDEX IF NOT EXISTS departments_seq_idx ON departments (_seq)",
            "CREATE INDEX IF NOT EXISTS settings_seq_idx ON settings (_seq)",
            "CREATE TABLE IF NOT EXISTS record_tombstones (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                seq BIGINT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            "CREATE INDEX IF NOT EXISTS record_tombstones_seq_idx ON record_tombstones (collection, seq)",
        ],
    },
];

const CREATE_LEDGER: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version BIGINT PRIMARY KEY,
    description TEXT NOT NULL,
    applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

/// Applies pending migrations in version order. Returns how many ran.
pub async fn run(pool: &PgPool) -> Result<usize, DatabaseError> {
    sqlx::query(CREATE_LEDGER).execute(pool).await?;

    let applied: HashSet<i64> = sqlx::query_scalar::<_, i64>("SELECT version FROM schema_migrations")
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let mut ran = 0;
    for migration in pending(MIGRATIONS, &applied) {
        apply(pool, migration)
            .await
            .map_err(|source| DatabaseError::Migration {
                version: migration.version,
                description: migration.description,
                source,
            })?;
        info!(
            version = migration.version,
            description = migration.description,
            "Applied migration"
        );
        ran += 1;
    }

    if ran == 0 {
        info!("Database schema is up to date");
    }
    Ok(ran)
}

fn pending<'a>(
    migrations: &'a [Migration],
    applied: &'a HashSet<i64>,
) -> impl Iterator<Item = &'a Migration> + 'a {
    migrations.iter().filter(move |m| !applied.contains(&m.version))
}

async fn apply(pool: &PgPool, migration: &Migration) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for statement in migration.statements {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    sqlx::query("INSERT INTO schema_migrations (version, description) VALUES ($1, $2)")
        .bind(migration.version)
        .bind(migration.description)
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}
