use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::debug;

use super::{Change, ChangeBatch, RecordStore, StoreError};
use crate::records::{
    each_record, with_entity, Break, Collection, Department, Employee, Entity, Location, Record,
    Settings, TimeRecord,
};

/// Record kinds that can be read from and written to their table.
pub trait PgEntity: Entity + for<'r> FromRow<'r, PgRow> + Unpin {
    /// Binds one value per entry of `COLUMNS`, in order.
    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments>;
}

impl PgEntity for Employee {
    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.id)
            .bind(&self.name)
            .bind(&self.pin)
            .bind(&self.image_url)
            .bind(self.archived)
            .bind(self.auto_deduct_lunch)
            .bind(&self.location_id)
            .bind(&self.department_id)
            .bind(self.is_temp)
            .bind(&self.temp_agency)
    }
}

impl PgEntity for TimeRecord {
    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.id)
            .bind(&self.employee_id)
            .bind(&self.location_id)
            .bind(self.clock_in)
            .bind(self.clock_out)
            .bind(Json(&self.breaks))
    }
}

impl<'r> FromRow<'r, PgRow> for TimeRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let Json(breaks): Json<Vec<Break>> = row.try_get("breaks")?;
        Ok(Self {
            id: row.try_get("id")?,
            employee_id: row.try_get("employee_id")?,
            location_id: row.try_get("location_id")?,
            clock_in: row.try_get("clock_in")?,
            clock_out: row.try_get("clock_out")?,
            breaks,
        })
    }
}

impl PgEntity for Location {
    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query.bind(&self.id).bind(&self.name).bind(&self.abbreviation)
    }
}

impl PgEntity for Department {
    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query.bind(&self.id).bind(&self.name)
    }
}

impl PgEntity for Settings {
    fn bind_columns<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.id)
            .bind(&self.logo_url)
            .bind(self.week_start_day)
            .bind(&self.remote_db_url)
            .bind(self.screen_saver_enabled)
            .bind(&self.clock_format)
            .bind(self.screen_saver_timeout)
            .bind(self.clock_in_screen_timeout)
            .bind(self.admin_screen_timeout)
    }
}

/// SQL text for one entity kind.
struct Statements;

impl Statements {
    fn select<E: PgEntity>() -> String {
        format!(
            "SELECT {}, _seq FROM {}",
            E::COLUMNS.join(", "),
            E::COLLECTION.table()
        )
    }

    /// INSERT that assigns the next write sequence; `on_conflict` completes it.
    fn insert<E: PgEntity>(on_conflict: &str) -> String {
        let placeholders: Vec<String> = (1..=E::COLUMNS.len()).map(|i| format!("${i}")).collect();
        format!(
            "INSERT INTO {table} ({columns}, _seq) VALUES ({values}, nextval('record_write_seq')) \
             ON CONFLICT (id) {on_conflict} RETURNING {columns}, _seq",
            table = E::COLLECTION.table(),
            columns = E::COLUMNS.join(", "),
            values = placeholders.join(", "),
        )
    }

    fn create<E: PgEntity>() -> String {
        Self::insert::<E>("DO NOTHING")
    }

    fn upsert<E: PgEntity>() -> String {
        let assignments: Vec<String> = E::COLUMNS
            .iter()
            .skip(1)
            .map(|column| format!("{column} = EXCLUDED.{column}"))
            .chain(std::iter::once("_seq = EXCLUDED._seq".to_string()))
            .collect();
        Self::insert::<E>(&format!("DO UPDATE SET {}", assignments.join(", ")))
    }
}

/// Transaction-scoped lock taken before a write draws from
/// `record_write_seq`, so sequence numbers commit in increasing order and a
/// pull never moves its checkpoint past a write that is still in flight.
const WRITE_LOCK: &str = "SELECT pg_advisory_xact_lock($1)";
const WRITE_LOCK_KEY: i64 = 0x7469_6d65_636c_6f63;

const CLEAR_TOMBSTONE: &str = "DELETE FROM record_tombstones WHERE collection = $1 AND id = $2";

/// Both feed queries read one snapshot, which holds a committed prefix of the
/// write sequence.
const SNAPSHOT_READ: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY";

/// One row per deleted id, removed only when the id is written again.
const WRITE_TOMBSTONE: &str = "INSERT INTO record_tombstones (collection, id, seq) \
     VALUES ($1, $2, nextval('record_write_seq')) \
     ON CONFLICT (collection, id) DO UPDATE SET seq = EXCLUDED.seq";

const SELECT_TOMBSTONES: &str = "SELECT id, seq FROM record_tombstones \
     WHERE collection = $1 AND seq > $2 ORDER BY seq LIMIT $3";

fn decode<E: PgEntity>(row: &PgRow) -> Result<(u64, Record), StoreError> {
    let sequence: i64 = row.try_get("_seq")?;
    let entity = E::from_row(row)?;
    Ok((sequence.max(0) as u64, entity.into()))
}

fn to_sql_sequence(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Postgres-backed store; tables are created by the migrations in
/// `database::migrations`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list_as<E: PgEntity>(&self) -> Result<Vec<Record>, StoreError> {
        let sql = format!("{} ORDER BY id", Statements::select::<E>());
        sqlx::query(&sql)
            .fetch(&self.pool)
            .map(|row| decode::<E>(&row?).map(|(_, record)| record))
            .try_collect()
            .await
    }

    async fn get_as<E: PgEntity>(&self, id: &str) -> Result<Record, StoreError> {
        let sql = format!("{} WHERE id = $1", Statements::select::<E>());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(E::COLLECTION, id))?;
        Ok(decode::<E>(&row)?.1)
    }

    async fn begin_write(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(WRITE_LOCK)
            .bind(WRITE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn write_as<E: PgEntity>(&self, entity: &E, sql: &str) -> Result<Option<Record>, StoreError> {
        let mut tx = self.begin_write().await?;

        let row = entity
            .bind_columns(sqlx::query(sql))
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            // ON CONFLICT DO NOTHING returned nothing; leave the tombstone alone.
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(CLEAR_TOMBSTONE)
            .bind(E::COLLECTION.name())
            .bind(entity.id())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        let (sequence, record) = decode::<E>(&row)?;
        debug!(collection = %E::COLLECTION, id = entity.id(), sequence, "write");
        Ok(Some(record))
    }

    async fn create_as<E: PgEntity>(&self, entity: E) -> Result<Record, StoreError> {
        self.write_as(&entity, &Statements::create::<E>())
            .await?
            .ok_or_else(|| StoreError::conflict(E::COLLECTION, entity.id()))
    }

    async fn upsert_as<E: PgEntity>(&self, entity: E) -> Result<Record, StoreError> {
        self.write_as(&entity, &Statements::upsert::<E>())
            .await?
            .ok_or_else(|| StoreError::conflict(E::COLLECTION, entity.id()))
    }

    async fn changes_as<E: PgEntity>(&self, since: u64, limit: usize) -> Result<ChangeBatch, StoreError> {
        // One extra row from each source tells whether more remain.
        let fetch = i64::try_from(limit.saturating_add(1)).unwrap_or(i64::MAX);
        let since_sql = to_sql_sequence(since);

        let sql = format!(
            "{} WHERE _seq > $1 ORDER BY _seq LIMIT $2",
            Statements::select::<E>()
        );
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_READ).execute(&mut *tx).await?;

        let mut changes: Vec<Change> = sqlx::query(&sql)
            .bind(since_sql)
            .bind(fetch)
            .fetch(&mut *tx)
            .map(|row| {
                decode::<E>(&row?).map(|(sequence, record)| Change::Upsert { sequence, record })
            })
            .try_collect()
            .await?;

        let tombstones = sqlx::query(SELECT_TOMBSTONES)
            .bind(E::COLLECTION.name())
            .bind(since_sql)
            .bind(fetch)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        for row in tombstones {
            let sequence: i64 = row.try_get("seq")?;
            changes.push(Change::Delete {
                sequence: sequence.max(0) as u64,
                id: row.try_get("id")?,
            });
        }

        Ok(ChangeBatch::assemble(changes, since, limit))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        with_entity!(collection, E => self.list_as::<E>().await)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Record, StoreError> {
        with_entity!(collection, E => self.get_as::<E>(id).await)
    }

    async fn create(&self, record: Record) -> Result<Record, StoreError> {
        each_record!(record, entity => self.create_as(entity).await)
    }

    async fn upsert(&self, record: Record) -> Result<Record, StoreError> {
        each_record!(record, entity => self.upsert_as(entity).await)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut tx = self.begin_write().await?;

        let sql = format!("DELETE FROM {} WHERE id = $1", collection.table());
        let deleted = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::not_found(collection, id));
        }

        sqlx::query(WRITE_TOMBSTONE)
            .bind(collection.name())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(%collection, id, "delete");
        Ok(())
    }

    async fn changes_since(
        &self,
        collection: Collection,
        since: u64,
        limit: usize,
    ) -> Result<ChangeBatch, StoreError> {
        with_entity!(collection, E => self.changes_as::<E>(since, limit).await)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
