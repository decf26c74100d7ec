use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult};

/// GET /verify - Lets a kiosk confirm its token before going online
pub async fn verify() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({ "ok": true })))
}
