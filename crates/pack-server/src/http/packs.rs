use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use pack_registry::Pack;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use serde_json::json;
use tokio::task;
use tokio_util::io::ReaderStream;

use super::{ServerState, error_response, pack_not_found};

/// Everything outside the RFC 3986 unreserved set is escaped in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Public JSON shape of a pack.
#[derive(Debug, Clone, Serialize)]
pub struct PackView {
    pub name: String,
    pub description: String,
    pub pack_format: u32,
    pub size: u64,
    pub hash: String,
    pub last_modified: i64,
    pub is_directory: bool,
    pub download_url: String,
    pub hash_url: String,
}

impl From<&Pack> for PackView {
    fn from(pack: &Pack) -> Self {
        Self {
            name: pack.name.clone(),
            description: pack.description.clone(),
            pack_format: pack.format_version,
            size: pack.size_bytes,
            hash: pack.fingerprint.to_string(),
            last_modified: pack.last_modified_unix(),
            is_directory: pack.is_directory(),
            download_url: route("/download", &pack.name),
            hash_url: route("/hash", &pack.name),
        }
    }
}

fn route(prefix: &str, name: &str) -> String {
    format!("{prefix}/{}", utf8_percent_encode(name, PATH_SEGMENT))
}

pub async fn list(State(state): State<ServerState>) -> impl IntoResponse {
    let data = state
        .registry
        .all()
        .iter()
        .map(|pack| PackView::from(pack.as_ref()))
        .collect::<Vec<_>>();
    let count = data.len();
    Json(json!({ "success": true, "data": data, "count": count }))
}

pub async fn show(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    match state.registry.get(&name) {
        Some(pack) => Json(json!({ "success": true, "data": PackView::from(pack.as_ref()) }))
            .into_response(),
        None => pack_not_found(),
    }
}

pub async fn hash(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    match state.registry.hash(&name) {
        Some(fingerprint) => Json(json!({
            "success": true,
            "data": {
                "name": name,
                "hash": fingerprint.as_str(),
                "hash_type": fingerprint.algorithm(),
            },
        }))
        .into_response(),
        None => pack_not_found(),
    }
}

pub async fn download(State(state): State<ServerState>, Path(name): Path<String>) -> Response {
    let Some(pack) = state.registry.get(&name) else {
        return pack_not_found();
    };

    let archives = state.archives.clone();
    let target = Arc::clone(&pack);
    let path = match task::spawn_blocking(move || archives.materialize(&target)).await {
        Ok(Ok(path)) => path,
        Ok(Err(err)) => {
            tracing::error!(pack = %pack.name, error = %err, "failed to prepare download");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to prepare download: {err}"),
            );
        }
        Err(err) => {
            tracing::error!(pack = %pack.name, error = %err, "archive task failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to prepare download");
        }
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(pack = %pack.name, path = %path.display(), error = %err, "failed to open archive");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to open archive");
        }
    };
    let length = file.metadata().await.map(|meta| meta.len()).ok();
    tracing::info!(pack = %pack.name, kind = pack.kind.label(), "serving download");

    let disposition = format!(
        "attachment; filename=\"{}.zip\"",
        pack.name.replace(['"', '\\'], "_")
    );
    let mut response = (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response();
    if let Some(length) = length {
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, length.into());
    }
    response
}
