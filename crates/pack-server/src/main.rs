use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pack_registry::{ArchiveCache, Registry, start_pack_watcher};
use pack_server::{HttpServer, ServerState, Settings, telemetry};
use tokio::{signal, task};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "pack-server", version)]
struct Cli {
    /// Settings file (defaults to settings.yaml, then config/settings.yaml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Port to serve on, overriding the settings file and environment
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "pack server failed");
        eprintln!("pack-server: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = Settings::discover(Path::new("."), cli.config.as_deref())
        .context("failed to load settings")?;
    let mut settings = loaded.settings;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    fs::create_dir_all(&settings.packs.directory).with_context(|| {
        format!("failed to create pack directory {:?}", settings.packs.directory)
    })?;
    let _log_guard = telemetry::init(&settings.logging)?;

    if loaded.created {
        tracing::info!(path = %loaded.path.display(), "wrote default settings");
    }
    tracing::info!(
        config = %loaded.path.display(),
        directory = %settings.packs.directory.display(),
        file_monitor = settings.packs.file_monitor,
        addr = %settings.bind_address(),
        "loaded settings"
    );

    let registry = Arc::new(Registry::new(&settings.packs.directory));
    let initial = Arc::clone(&registry);
    match task::spawn_blocking(move || initial.rescan_blocking()).await {
        Ok(Ok(_)) => tracing::info!(count = registry.len(), "initial scan complete"),
        Ok(Err(err)) => tracing::error!(error = %err, "initial scan failed, starting with no packs"),
        Err(err) => tracing::error!(error = %err, "initial scan task failed, starting with no packs"),
    }

    let archives = ArchiveCache::in_temp_dir().context("failed to prepare archive directory")?;
    let (watcher, rescan) = start_pack_watcher(Arc::clone(&registry), settings.watch_config()?);

    let settings = Arc::new(settings);
    let state = ServerState::new(registry, archives, rescan, Arc::clone(&settings))?;
    let result = HttpServer::new(&settings, state)
        .serve(shutdown_signal())
        .await;

    watcher.shutdown(SHUTDOWN_GRACE).await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("received shutdown signal");
}
