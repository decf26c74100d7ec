//! Record persistence behind one async trait.
//!
//! Two backends implement [`RecordStore`]: [`MemoryStore`] keeps everything in
//! process memory, [`PgStore`] maps each collection onto a Postgres table.
//! Every write is stamped with a store-wide, strictly increasing sequence
//! number and deletes leave tombstones, which together form the change feed
//! read by sync pulls.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::records::{Collection, Record};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{collection} record '{id}' not found")]
    NotFound { collection: Collection, id: String },

    #[error("{collection} record '{id}' already exists")]
    Conflict { collection: Collection, id: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(collection: Collection, id: impl Into<String>) -> Self {
        StoreError::NotFound { collection, id: id.into() }
    }

    pub fn conflict(collection: Collection, id: impl Into<String>) -> Self {
        StoreError::Conflict { collection, id: id.into() }
    }
}

/// One entry of the change feed.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Upsert { sequence: u64, record: Record },
    Delete { sequence: u64, id: String },
}

impl Change {
    pub fn sequence(&self) -> u64 {
        match self {
            Change::Upsert { sequence, .. } | Change::Delete { sequence, .. } => *sequence,
        }
    }
}

/// Changes after a checkpoint, ordered by sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
    /// Sequence of the last change returned, or the requested one if none.
    pub checkpoint: u64,
    pub has_more: bool,
}

impl ChangeBatch {
    /// Merges candidate changes (each list may hold up to `limit + 1`
    /// entries) into one ordered batch of at most `limit`.
    pub(crate) fn assemble(mut changes: Vec<Change>, since: u64, limit: usize) -> Self {
        changes.sort_by_key(Change::sequence);
        let has_more = changes.len() > limit;
        changes.truncate(limit);
        let checkpoint = changes.last().map(Change::sequence).unwrap_or(since);
        Self { changes, checkpoint, has_more }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// All records of a collection ordered by id.
    async fn list(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Record, StoreError>;

    /// Inserts a new record; fails with `Conflict` if the id is taken.
    async fn create(&self, record: Record) -> Result<Record, StoreError>;

    /// Inserts or wholly replaces the record with the same id.
    async fn upsert(&self, record: Record) -> Result<Record, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Up to `limit` changes with a sequence greater than `since`.
    async fn changes_since(
        &self,
        collection: Collection,
        since: u64,
        limit: usize,
    ) -> Result<ChangeBatch, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn RecordStore>;
