use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult};
use crate::records::mapper;
use crate::AppState;

use super::utils::{ensure_deletable, parse_collection};

/// GET /:collection/:id - Get a single record by ID
pub async fn get(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let collection = parse_collection(&collection)?;

    let record = state.store.get(collection, &id).await?;
    Ok(ApiResponse::success(mapper::to_wire(&record)?))
}

/// PUT /:collection/:id - Insert or wholly replace a record.
///
/// The path id wins over any `id` in the body.
pub async fn put(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let collection = parse_collection(&collection)?;
    let Json(payload) = payload?;

    let record = mapper::to_storage(collection, mapper::with_id(payload, &id))?;
    let stored = state.store.upsert(record).await?;

    tracing::debug!(%collection, %id, "Upserted record");
    Ok(ApiResponse::success(mapper::to_wire(&stored)?))
}

/// DELETE /:collection/:id - Delete a record, leaving a tombstone for sync
pub async fn delete(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let collection = parse_collection(&collection)?;
    ensure_deletable(collection)?;

    state.store.delete(collection, &id).await?;

    tracing::info!(%collection, %id, "Deleted record");
    Ok(ApiResponse::success(json!({ "ok": true })))
}
