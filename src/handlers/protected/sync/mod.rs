// handlers/protected/sync - Offline kiosk replication
//
// Pull reads the store's change feed after a checkpoint; push applies a
// batch of client writes with last-write-wins semantics.
pub mod pull;
pub mod push;

pub use pull::pull;
pub use push::push;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Sync bodies are optional, so an empty body decodes as the default value.
fn decode_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::invalid_json(format!("Invalid sync body: {e}")))
}
