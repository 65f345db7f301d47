use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::{ENDPOINTS, ServerState, error_response, rfc3339, unix_now};

pub async fn rescan(State(state): State<ServerState>) -> Response {
    match state.rescan.trigger() {
        Ok(()) => {
            tracing::info!("pack.rescan.requested");
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "success": true,
                    "message": "rescan started",
                    "timestamp": unix_now(),
                })),
            )
                .into_response()
        }
        Err(err) => {
            tracing::warn!(error = %err, "rescan trigger failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}

pub async fn debug(State(state): State<ServerState>) -> impl IntoResponse {
    let status = state.registry.status();
    Json(json!({
        "server": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "config": state.settings.as_ref(),
        "pack_directory": state.registry.root_directory().display().to_string(),
        "pack_count": state.registry.len(),
        "archive_cache": state.archives.dir().display().to_string(),
        "endpoints": ENDPOINTS,
        "timestamp": unix_now(),
        "last_scan": status.last_scan_at.and_then(rfc3339),
        "last_error": status.last_error,
        "completed_scans": status.completed_scans,
    }))
}
