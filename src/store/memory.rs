use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Change, ChangeBatch, RecordStore, StoreError};
use crate::records::{Collection, Record};

/// Ephemeral store; contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    sequence: u64,
    records: HashMap<Collection, BTreeMap<String, Stored>>,
    /// Deleted ids and the sequence of their delete. Kept until the id is
    /// written again; never pruned, so a pull from any checkpoint sees every
    /// delete after it.
    tombstones: HashMap<Collection, BTreeMap<String, u64>>,
}

struct Stored {
    sequence: u64,
    record: Record,
}

impl State {
    fn contains(&self, collection: Collection, id: &str) -> bool {
        self.records
            .get(&collection)
            .is_some_and(|records| records.contains_key(id))
    }

    fn write(&mut self, record: Record) -> Record {
        self.sequence += 1;
        let collection = record.collection();
        let id = record.id().to_string();

        if let Some(tombstones) = self.tombstones.get_mut(&collection) {
            tombstones.remove(&id);
        }
        self.records.entry(collection).or_default().insert(
            id,
            Stored { sequence: self.sequence, record: record.clone() },
        );
        record
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .records
            .get(&collection)
            .map(|records| records.values().map(|stored| stored.record.clone()).collect())
            .unwrap_or_default())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Record, StoreError> {
        let state = self.state.read().await;
        state
            .records
            .get(&collection)
            .and_then(|records| records.get(id))
            .map(|stored| stored.record.clone())
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn create(&self, record: Record) -> Result<Record, StoreError> {
        let mut state = self.state.write().await;
        if state.contains(record.collection(), record.id()) {
            return Err(StoreError::conflict(record.collection(), record.id()));
        }
        debug!(collection = %record.collection(), id = record.id(), "create");
        Ok(state.write(record))
    }

    async fn upsert(&self, record: Record) -> Result<Record, StoreError> {
        let mut state = self.state.write().await;
        debug!(collection = %record.collection(), id = record.id(), "upsert");
        Ok(state.write(record))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let removed = state
            .records
            .get_mut(&collection)
            .and_then(|records| records.remove(id));
        if removed.is_none() {
            return Err(StoreError::not_found(collection, id));
        }

        state.sequence += 1;
        let sequence = state.sequence;
        state
            .tombstones
            .entry(collection)
            .or_default()
            .insert(id.to_string(), sequence);
        debug!(%collection, id, sequence, "delete");
        Ok(())
    }

    async fn changes_since(
        &self,
        collection: Collection,
        since: u64,
        limit: usize,
    ) -> Result<ChangeBatch, StoreError> {
        let state = self.state.read().await;
        let keep = limit.saturating_add(1);

        let mut upserts: Vec<&Stored> = state
            .records
            .get(&collection)
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|stored| stored.sequence > since)
            .collect();
        upserts.sort_unstable_by_key(|stored| stored.sequence);
        upserts.truncate(keep);

        let mut deletes: Vec<(&String, u64)> = state
            .tombstones
            .get(&collection)
            .into_iter()
            .flat_map(|tombstones| tombstones.iter())
            .filter(|(_, sequence)| **sequence > since)
            .map(|(id, sequence)| (id, *sequence))
            .collect();
        deletes.sort_unstable_by_key(|(_, sequence)| *sequence);
        deletes.truncate(keep);

        let candidates = upserts
            .into_iter()
            .map(|stored| Change::Upsert {
                sequence: stored.sequence,
                record: stored.record.clone(),
            })
            .chain(
                deletes
                    .into_iter()
                    .map(|(id, sequence)| Change::Delete { sequence, id: id.clone() }),
            )
            .collect();

        Ok(ChangeBatch::assemble(candidates, since, limit))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
