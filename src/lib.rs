pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod records;
pub mod server;
pub mod store;

use middleware::AuthGate;
use store::SharedStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub auth: AuthGate,
    /// Ceiling applied to a pull's `batchSize`.
    pub sync_max_batch: usize,
}

impl AppState {
    pub fn new(store: SharedStore, auth: AuthGate, sync_max_batch: usize) -> Self {
        Self {
            store,
            auth,
            sync_max_batch: sync_max_batch.max(1),
        }
    }
}
