use axum::{
    body::Bytes,
    extract::{Path, State},
};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::handlers::protected::data::utils::{ensure_deletable, parse_collection};
use crate::middleware::{ApiResponse, ApiResult};
use crate::records::{mapper, Collection, Record};
use crate::store::StoreError;
use crate::AppState;

use super::decode_body;

/// One client write after validation.
#[derive(Debug, PartialEq)]
enum Write {
    Upsert(Record),
    Delete(String),
}

/// POST /sync/:collection/push - Apply client writes, last write wins.
///
/// Every document is validated before anything is written, so a bad row
/// rejects the whole batch.
pub async fn push(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    body: Bytes,
) -> ApiResult<Value> {
    let collection = parse_collection(&collection)?;
    let payload: Value = decode_body::<Option<Value>>(&body)?.unwrap_or(Value::Array(Vec::new()));

    let writes = documents(payload)?
        .into_iter()
        .enumerate()
        .map(|(index, doc)| parse_write(collection, index, doc))
        .collect::<Result<Vec<_>, _>>()?;

    let mut written = 0;
    for write in writes {
        match write {
            Write::Upsert(record) => {
                state.store.upsert(record).await?;
            }
            Write::Delete(id) => match state.store.delete(collection, &id).await {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            },
        }
        written += 1;
    }

    tracing::debug!(%collection, written, "Sync push");
    Ok(ApiResponse::success(json!({ "ok": true, "written": written })))
}

/// Accepts a bare array or `{documents: [...]}`; write rows are unwrapped
/// to their `newDocumentState`.
fn documents(payload: Value) -> Result<Vec<Value>, ApiError> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(mut object) => match object.remove("documents") {
            Some(Value::Array(rows)) => rows,
            _ => return Err(ApiError::bad_request("Push body must be an array of documents")),
        },
        _ => return Err(ApiError::bad_request("Push body must be an array of documents")),
    };

    Ok(rows
        .into_iter()
        .map(|row| match row {
            Value::Object(mut object) if object.contains_key("newDocumentState") => {
                object.remove("newDocumentState").unwrap_or(Value::Null)
            }
            other => other,
        })
        .collect())
}

fn parse_write(collection: Collection, index: usize, doc: Value) -> Result<Write, ApiError> {
    let deleted = doc.get("_deleted").and_then(Value::as_bool).unwrap_or(false);
    if !deleted {
        return Ok(Write::Upsert(mapper::to_storage(collection, doc)?));
    }

    ensure_deletable(collection)?;
    match doc.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => Ok(Write::Delete(id.to_string())),
        _ => Err(ApiError::bad_request(format!(
            "Deleted document at index {index} has no id"
        ))),
    }
}
