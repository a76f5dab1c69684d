use axum::Json;
use serde_json::{json, Value};

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service liveness"))
)]
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
