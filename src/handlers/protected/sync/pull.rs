use axum::{
    body::Bytes,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::handlers::protected::data::utils::parse_collection;
use crate::middleware::{ApiResponse, ApiResult};
use crate::records::mapper;
use crate::store::{Change, ChangeBatch};
use crate::AppState;

use super::decode_body;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Kept loose: anything that is not `{sequence}` restarts from zero.
    #[serde(default)]
    pub checkpoint: Option<Value>,
    #[serde(default)]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub sequence: u64,
}

impl Checkpoint {
    fn parse(raw: Option<Value>) -> Self {
        raw.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub documents: Vec<Value>,
    pub checkpoint: Checkpoint,
    pub has_more: bool,
}

/// POST /sync/:collection/pull - Changes after the client's checkpoint
pub async fn pull(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> ApiResult<PullResponse> {
    let collection = parse_collection(&collection)?;
    let request: PullRequest = decode_body(&body)?;

    let since = Checkpoint::parse(request.checkpoint).sequence;
    let limit = batch_limit(request.batch_size, state.sync_max_batch);

    let batch = state.store.changes_since(collection, since, limit).await?;
    let response = to_response(batch)?;

    tracing::debug!(
        %collection,
        since,
        returned = response.documents.len(),
        has_more = response.has_more,
        "Sync pull"
    );
    Ok(ApiResponse::success(response))
}

fn batch_limit(requested: Option<usize>, max: usize) -> usize {
    let max = max.max(1);
    requested.unwrap_or(max).clamp(1, max)
}

fn to_response(batch: ChangeBatch) -> Result<PullResponse, ApiError> {
    let documents = batch
        .changes
        .iter()
        .map(document)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PullResponse {
        documents,
        checkpoint: Checkpoint { sequence: batch.checkpoint },
        has_more: batch.has_more,
    })
}

fn document(change: &Change) -> Result<Value, ApiError> {
    match change {
        Change::Upsert { record, .. } => {
            let mut wire = mapper::to_wire(record)?;
            if let Value::Object(object) = &mut wire {
                object.insert("_deleted".into(), Value::Bool(false));
            }
            Ok(wire)
        }
        Change::Delete { id, .. } => Ok(mapper::tombstone(id)),
    }
}
