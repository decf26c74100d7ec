//! Store and HTTP behaviour against a real Postgres.
//!
//! Runs only when `DATABASE_URL` is set. Each test migrates a private schema
//! and drops it afterwards, so tests can run in parallel on one database.

mod common;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, Executor, PgPool};

use common::{expect_error, expect_json, Options};
use timeclock_api::database::migrations::{self, MIGRATIONS};
use timeclock_api::records::{Collection, Location, Record};
use timeclock_api::store::{Change, PgStore, RecordStore, StoreError};

static NEXT_SCHEMA: AtomicUsize = AtomicUsize::new(0);

struct TestDb {
    admin: PgPool,
    pool: PgPool,
    schema: String,
}

impl TestDb {
    /// Fresh empty schema, or `None` when no database is configured.
    async fn open() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set; skipping Postgres test");
            return Ok(None);
        };

        let stamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
        let schema = format!(
            "timeclock_test_{}_{}_{}",
            std::process::id(),
            stamp,
            NEXT_SCHEMA.fetch_add(1, Ordering::Relaxed)
        );

        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        admin.execute(format!("CREATE SCHEMA {schema}").as_str()).await?;

        let set_path = format!("SET search_path TO {schema}");
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .after_connect(move |conn, _meta| {
                let set_path = set_path.clone();
                Box::pin(async move {
                    conn.execute(set_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await?;

        Ok(Some(Self { admin, pool, schema }))
    }

    /// Fresh schema with every migration applied.
    async fn migrated() -> Result<Option<Self>> {
        let Some(db) = Self::open().await? else {
            return Ok(None);
        };
        migrations::run(&db.pool).await?;
        Ok(Some(db))
    }

    fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    async fn drop_schema(self) -> Result<()> {
        self.pool.close().await;
        self.admin
            .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
            .await?;
        self.admin.close().await;
        Ok(())
    }
}

fn location(id: &str, name: &str) -> Record {
    Location { id: id.into(), name: name.into(), abbreviation: None }.into()
}

fn feed_ids(changes: &[Change]) -> Vec<(bool, String)> {
    changes
        .iter()
        .map(|change| match change {
            Change::Upsert { record, .. } => (false, record.id().to_string()),
            Change::Delete { id, .. } => (true, id.clone()),
        })
        .collect()
}

#[tokio::test]
async fn migrations_apply_once() -> Result<()> {
    let Some(db) = TestDb::open().await? else {
        return Ok(());
    };

    assert_eq!(migrations::run(&db.pool).await?, MIGRATIONS.len());
    assert_eq!(migrations::run(&db.pool).await?, 0);

    let versions: Vec<i64> =
        sqlx::query_scalar("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(&db.pool)
            .await?;
    let expected: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
    assert_eq!(versions, expected);

    db.drop_schema().await
}

#[tokio::test]
async fn crud_round_trips_through_tables() -> Result<()> {
    let Some(db) = TestDb::migrated().await? else {
        return Ok(());
    };
    let store = db.store();
    store.health_check().await?;

    store.create(location("LOC002", "Annex")).await?;
    store.create(location("LOC001", "Main")).await?;
    let err = store.create(location("LOC001", "Other")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { collection: Collection::Locations, .. }));
    assert_eq!(store.get(Collection::Locations, "LOC001").await?, location("LOC001", "Main"));

    let replacement: Record = Location {
        id: "LOC002".into(),
        name: "Annex".into(),
        abbreviation: Some("ANX".into()),
    }
    .into();
    store.upsert(replacement.clone()).await?;
    assert_eq!(
        store.list(Collection::Locations).await?,
        vec![location("LOC001", "Main"), replacement]
    );

    store.delete(Collection::Locations, "LOC001").await?;
    let err = store.get(Collection::Locations, "LOC001").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    let err = store.delete(Collection::Locations, "LOC001").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert!(store.list(Collection::Departments).await?.is_empty());

    // Tombstones are never pruned by later writes.
    for i in 0..20 {
        store.upsert(location(&format!("X{i:02}"), "L")).await?;
    }
    let feed = store.changes_since(Collection::Locations, 0, 100).await?;
    assert!(feed_ids(&feed.changes).contains(&(true, "LOC001".into())));

    db.drop_schema().await
}

#[tokio::test]
async fn change_feed_merges_tombstones_and_pages() -> Result<()> {
    let Some(db) = TestDb::migrated().await? else {
        return Ok(());
    };
    let store = db.store();

    for id in ["LOC001", "LOC002", "LOC003"] {
        store.upsert(location(id, "L")).await?;
    }
    store.delete(Collection::Locations, "LOC002").await?;
    store.upsert(location("LOC001", "Renamed")).await?;

    let first = store.changes_since(Collection::Locations, 0, 2).await?;
    assert!(first.has_more);
    assert_eq!(
        feed_ids(&first.changes),
        vec![(true, "LOC002".into()), (false, "LOC003".into())]
    );

    let rest = store.changes_since(Collection::Locations, first.checkpoint, 10).await?;
    assert!(!rest.has_more);
    assert_eq!(feed_ids(&rest.changes), vec![(false, "LOC001".into())]);
    assert!(rest.checkpoint > first.checkpoint);

    // A recreated record replaces its tombstone in the feed.
    store.create(location("LOC002", "Back")).await?;
    let all = store.changes_since(Collection::Locations, 0, 10).await?;
    assert!(!feed_ids(&all.changes).contains(&(true, "LOC002".into())));
    assert_eq!(all.changes.len(), 3);

    let sequences: Vec<u64> = all.changes.iter().map(Change::sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]), "{sequences:?}");

    let idle = store.changes_since(Collection::Locations, all.checkpoint, 10).await?;
    assert!(idle.changes.is_empty());
    assert_eq!(idle.checkpoint, all.checkpoint);

    db.drop_schema().await
}

#[tokio::test]
async fn concurrent_writers_never_slip_behind_a_checkpoint() -> Result<()> {
    let Some(db) = TestDb::migrated().await? else {
        return Ok(());
    };
    let store = Arc::new(db.store());

    const WRITERS: usize = 6;
    const PER_WRITER: usize = 25;

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 0..PER_WRITER {
                    store.upsert(location(&format!("W{w}-{i:03}"), "L")).await?;
                }
                Ok::<_, StoreError>(())
            })
        })
        .collect();

    // Pull incrementally while the writers run, then drain.
    let mut seen = BTreeSet::new();
    let mut checkpoint = 0;
    let mut writers_done = false;
    loop {
        let batch = store.changes_since(Collection::Locations, checkpoint, 7).await?;
        seen.extend(feed_ids(&batch.changes).into_iter().map(|(_, id)| id));
        checkpoint = batch.checkpoint;

        if writers_done && !batch.has_more {
            break;
        }
        if !writers_done && writers.iter().all(|w| w.is_finished()) {
            writers_done = true;
        }
        tokio::task::yield_now().await;
    }
    for writer in writers {
        writer.await??;
    }

    let expected: BTreeSet<String> = (0..WRITERS)
        .flat_map(|w| (0..PER_WRITER).map(move |i| format!("W{w}-{i:03}")))
        .collect();
    assert_eq!(seen, expected);

    db.drop_schema().await
}

#[tokio::test]
async fn http_api_over_postgres() -> Result<()> {
    let Some(db) = TestDb::migrated().await? else {
        return Ok(());
    };
    let server = common::spawn_on(Arc::new(db.store()), Options::default()).await?;

    let res = server.get("/health").send().await?;
    let health = expect_json(res, StatusCode::OK).await?;
    assert_eq!(health["database"], "ok", "{}", health);

    let res = server.get("/employees").send().await?;
    let employees = expect_json(res, StatusCode::OK).await?;
    let ids: Vec<&str> = employees
        .as_array()
        .map(|list| list.iter().filter_map(|e| e["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, vec!["EMP001", "EMP002", "EMP003"]);

    let res = server
        .post("/departments")
        .json(&json!({"id": "DEP001", "name": "Again"}))
        .send()
        .await?;
    assert_eq!(expect_error(res, StatusCode::CONFLICT).await?, "CONFLICT");

    let record = json!({
        "id": "TR001",
        "employeeId": "EMP001",
        "locationId": "LOC001",
        "clockIn": "2024-03-04T08:00:00Z",
        "clockOut": "2024-03-04T16:30:00Z",
        "breaks": [{"start": "2024-03-04T12:00:00Z", "end": "2024-03-04T12:30:00Z"}]
    });
    let res = server.put("/timeRecords/TR001").json(&record).send().await?;
    expect_json(res, StatusCode::OK).await?;
    let res = server.get("/timeRecords/TR001").send().await?;
    assert_eq!(expect_json(res, StatusCode::OK).await?, record);

    let res = server.post("/sync/departments/pull").json(&json!({})).send().await?;
    let snapshot = expect_json(res, StatusCode::OK).await?;
    let checkpoint = snapshot["checkpoint"].clone();

    let res = server
        .post("/sync/departments/push")
        .json(&json!([
            {"id": "DEP003", "name": "Night Shift"},
            {"id": "DEP001", "_deleted": true}
        ]))
        .send()
        .await?;
    expect_json(res, StatusCode::OK).await?;

    let res = server
        .post("/sync/departments/pull")
        .json(&json!({"checkpoint": checkpoint}))
        .send()
        .await?;
    let delta = expect_json(res, StatusCode::OK).await?;
    let docs = delta["documents"].as_array().cloned().unwrap_or_default();
    assert_eq!(
        docs,
        vec![
            json!({"id": "DEP003", "name": "Night Shift", "_deleted": false}),
            json!({"id": "DEP001", "_deleted": true}),
        ],
        "{}",
        delta
    );
    assert_eq!(delta["hasMore"], Value::Bool(false));

    db.drop_schema().await
}
