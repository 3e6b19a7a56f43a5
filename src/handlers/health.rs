use axum::Json;
use serde_json::{json, Value};

/// `GET /health` — liveness probe, no dependencies touched.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok"
    }))
}

/// `GET /healthz` — identical liveness semantics under the
/// Kubernetes-conventional path, for deployments that probe it
/// instead of `/health`.
pub async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok"
    }))
}
