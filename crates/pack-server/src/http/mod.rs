pub mod admin;
pub mod health;
pub mod index;
pub mod packs;

use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware, serve};
use handlebars::Handlebars;
use pack_registry::{ArchiveCache, Registry, RescanHandle};
use serde_json::json;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::net::TcpListener;

use crate::config::Settings;

/// Routes advertised by `/debug`.
pub const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /api/packs",
    "GET /api/packs/{name}",
    "GET /download/{name}",
    "GET /hash/{name}",
    "GET|POST /api/rescan",
    "GET /debug",
    "GET /healthz",
];

#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<Registry>,
    pub archives: ArchiveCache,
    pub rescan: RescanHandle,
    pub settings: Arc<Settings>,
    pub templates: Arc<Handlebars<'static>>,
}

impl ServerState {
    pub fn new(
        registry: Arc<Registry>,
        archives: ArchiveCache,
        rescan: RescanHandle,
        settings: Arc<Settings>,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            archives,
            rescan,
            settings,
            templates: Arc::new(index::templates()?),
        })
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index::handler))
        .route("/api/packs", get(packs::list))
        .route("/api/packs/{name}", get(packs::show))
        .route("/download/{name}", get(packs::download))
        .route("/hash/{name}", get(packs::hash))
        .route("/api/rescan", get(admin::rescan).post(admin::rescan))
        .route("/debug", get(admin::debug))
        .route("/healthz", get(health::handler))
        .layer(middleware::map_request(log_request))
        .with_state(state)
}

pub struct HttpServer {
    addr: String,
    router: Router,
}

impl HttpServer {
    pub fn new(settings: &Settings, state: ServerState) -> Self {
        Self {
            addr: settings.bind_address(),
            router: router(state),
        }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        tracing::info!(addr = %listener.local_addr()?, "pack server listening");
        serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .context("http server failed")?;
        tracing::info!("http server stopped");
        Ok(())
    }
}

async fn log_request(request: Request) -> Request {
    tracing::debug!(method = %request.method(), uri = %request.uri(), "request");
    request
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "error": message.into() })),
    )
        .into_response()
}

pub(crate) fn pack_not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "pack not found")
}

pub(crate) fn rfc3339(at: SystemTime) -> Option<String> {
    OffsetDateTime::from(at).format(&Rfc3339).ok()
}

pub(crate) fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
