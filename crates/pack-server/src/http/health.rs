use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use super::{ServerState, rfc3339};

/// Degraded until a scan has been published, and whenever the latest scan failed.
pub async fn handler(State(state): State<ServerState>) -> impl IntoResponse {
    let status = state.registry.status();
    let healthy = status.completed_scans > 0 && status.last_error.is_none();
    Json(serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "packs": state.registry.len(),
        "last_scan": status.last_scan_at.and_then(rfc3339),
        "last_error": status.last_error,
    }))
}
