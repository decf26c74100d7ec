use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::Value;

use crate::middleware::{ApiResponse, ApiResult};
use crate::records::mapper;
use crate::AppState;

use super::utils::parse_collection;

/// GET /:collection - List every record in the collection, ordered by id
pub async fn get(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> ApiResult<Vec<Value>> {
    let collection = parse_collection(&collection)?;

    let records = state.store.list(collection).await?;
    let data = records
        .iter()
        .map(mapper::to_wire)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApiResponse::success(data))
}

/// POST /:collection - Create one record; an existing id is a conflict
pub async fn post(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let collection = parse_collection(&collection)?;
    let Json(payload) = payload?;

    let record = mapper::to_storage(collection, payload)?;
    let created = state.store.create(record).await?;

    tracing::info!(%collection, id = created.id(), "Created record");
    Ok(ApiResponse::created(mapper::to_wire(&created)?))
}
