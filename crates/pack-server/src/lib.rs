//! HTTP distribution of resource packs from a watched directory.
//!
//! The binary wires [`config::Settings`] into a [`pack_registry::Registry`],
//! its rescan worker and the axum router in [`http`].

pub mod config;
pub mod http;
pub mod telemetry;

pub use config::{LoadedSettings, LogSettings, Settings};
pub use http::{HttpServer, ServerState, router};
