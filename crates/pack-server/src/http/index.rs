use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use handlebars::Handlebars;
use pack_registry::Pack;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use super::packs::PackView;
use super::{ServerState, error_response};

pub const INDEX_TEMPLATE: &str = "index";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Serialize)]
struct IndexPage {
    count: usize,
    packs: Vec<IndexRow>,
}

#[derive(Serialize)]
struct IndexRow {
    #[serde(flatten)]
    view: PackView,
    size_mb: String,
    kind: &'static str,
    modified: String,
}

impl From<&Pack> for IndexRow {
    fn from(pack: &Pack) -> Self {
        Self {
            view: PackView::from(pack),
            size_mb: format!("{:.2}", pack.size_bytes as f64 / BYTES_PER_MB),
            kind: pack.kind.label(),
            modified: OffsetDateTime::from(pack.last_modified)
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
                .unwrap_or_default(),
        }
    }
}

/// Template engine with the index page registered.
pub fn templates() -> Result<Handlebars<'static>> {
    let mut engine = Handlebars::new();
    engine.set_strict_mode(false);
    engine
        .register_template_string(INDEX_TEMPLATE, include_str!("../../templates/index.hbs"))
        .with_context(|| format!("failed to register template {INDEX_TEMPLATE}"))?;
    Ok(engine)
}

pub async fn handler(State(state): State<ServerState>) -> Response {
    match render(&state.templates, &state.registry.all()) {
        Ok(page) => Html(page).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to render index page");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to render index page")
        }
    }
}

pub(crate) fn render<P: AsRef<Pack>>(engine: &Handlebars<'_>, packs: &[P]) -> Result<String> {
    let page = IndexPage {
        count: packs.len(),
        packs: packs.iter().map(|pack| IndexRow::from(pack.as_ref())).collect(),
    };
    engine
        .render(INDEX_TEMPLATE, &page)
        .context("failed to render template")
}
