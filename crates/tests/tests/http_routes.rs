use std::fs::{self, File};
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use pack_registry::{ArchiveCache, PackWatcher, Registry, WatchConfig, start_pack_watcher};
use pack_server::{ServerState, Settings, router};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use zip::ZipArchive;
use zip::write::FileOptions;

struct Harness {
    _root: TempDir,
    registry: Arc<Registry>,
    router: Router,
    watcher: Option<PackWatcher>,
}

impl Harness {
    async fn new() -> Result<Self> {
        let root = tempfile::tempdir()?;
        let packs = root.path().join("packs");
        fs::create_dir_all(&packs)?;
        write_zip(
            &packs.join("foo.zip"),
            &[("pack.mcmeta", br#"{"pack":{"description":"Foo","pack_format":15}}"#)],
        )?;
        fs::create_dir_all(packs.join("bar/assets"))?;
        fs::write(
            packs.join("bar/pack.mcmeta"),
            br#"{"pack":{"description":"Bar","pack_format":9}}"#,
        )?;
        fs::write(packs.join("bar/assets/icon.png"), b"png-bytes")?;

        let registry = Arc::new(Registry::new(&packs));
        registry.rescan_blocking()?;

        let mut settings = Settings::default();
        settings.packs.directory = packs.clone();
        let watch = WatchConfig {
            enabled: false,
            ..settings.watch_config()?
        };
        let (watcher, rescan) = start_pack_watcher(Arc::clone(&registry), watch);
        let state = ServerState::new(
            Arc::clone(&registry),
            ArchiveCache::new(root.path().join("cache"))?,
            rescan,
            Arc::new(settings),
        )?;
        Ok(Self {
            router: router(state),
            registry,
            watcher: Some(watcher),
            _root: root,
        })
    }

    async fn request(&self, method: Method, uri: &str) -> Result<(StatusCode, Vec<u8>, axum::http::HeaderMap)> {
        let request = Request::builder().method(method).uri(uri).body(Body::empty())?;
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, body.to_vec(), headers))
    }

    async fn get_json(&self, uri: &str) -> Result<(StatusCode, Value)> {
        let (status, body, _) = self.request(Method::GET, uri).await?;
        Ok((status, serde_json::from_slice(&body)?))
    }
}

#[tokio::test]
async fn lists_packs_with_public_fields() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body) = harness.get_json("/api/packs").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);

    let data = body["data"].as_array().expect("data array");
    let names = data
        .iter()
        .map(|pack| pack["name"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["bar", "foo"]);

    let bar = &data[0];
    assert_eq!(bar["description"], "Bar");
    assert_eq!(bar["pack_format"], 9);
    assert_eq!(bar["is_directory"], true);
    assert_eq!(bar["download_url"], "/download/bar");
    assert_eq!(bar["hash_url"], "/hash/bar");
    assert_eq!(bar["hash"].as_str().map(str::len), Some(32));
    assert!(bar["last_modified"].as_i64().is_some());

    let foo = &data[1];
    assert_eq!(foo["description"], "Foo");
    assert_eq!(foo["pack_format"], 15);
    assert_eq!(foo["is_directory"], false);
    Ok(())
}

#[tokio::test]
async fn single_pack_and_missing_pack() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body) = harness.get_json("/api/packs/foo").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "foo");

    let (status, body) = harness.get_json("/api/packs/nope").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "pack not found");
    Ok(())
}

#[tokio::test]
async fn hash_matches_registry() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body) = harness.get_json("/hash/foo").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "foo");
    assert_eq!(body["data"]["hash_type"], "MD5");
    let expected = harness.registry.hash("foo").expect("foo indexed");
    assert_eq!(body["data"]["hash"], expected.as_str());

    let (status, _) = harness.get_json("/hash/nope").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn archive_download_streams_file_bytes() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body, headers) = harness.request(Method::GET, "/download/foo").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"foo.zip\""
    );
    let on_disk = fs::read(&harness.registry.get("foo").expect("foo").source_path)?;
    assert_eq!(body, on_disk);
    Ok(())
}

#[tokio::test]
async fn directory_download_is_zipped() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body, headers) = harness.request(Method::GET, "/download/bar").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"bar.zip\""
    );

    let mut archive = ZipArchive::new(Cursor::new(body))?;
    let mut icon = String::new();
    archive.by_name("assets/icon.png")?.read_to_string(&mut icon)?;
    assert_eq!(icon, "png-bytes");
    assert!(archive.by_name("pack.mcmeta").is_ok());

    let (status, _, _) = harness.request(Method::GET, "/download/nope").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn vanished_directory_download_fails_with_500() -> Result<()> {
    let harness = Harness::new().await?;
    let bar = harness.registry.get("bar").expect("bar");
    fs::remove_dir_all(&bar.source_path)?;

    let (status, body, _) = harness.request(Method::GET, "/download/bar").await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_slice(&body)?;
    assert_eq!(body["success"], false);
    assert!(harness.registry.get("bar").is_some());
    Ok(())
}

#[tokio::test]
async fn rescan_is_accepted_on_get_and_post() -> Result<()> {
    let harness = Harness::new().await?;
    let before = harness.registry.status().completed_scans;

    for method in [Method::GET, Method::POST] {
        let (status, body, _) = harness.request(method, "/api/rescan").await?;
        assert_eq!(status, StatusCode::ACCEPTED);
        let body: Value = serde_json::from_slice(&body)?;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "rescan started");
        assert!(body["timestamp"].as_i64().is_some());
    }

    wait_for(
        || harness.registry.status().completed_scans > before,
        Duration::from_secs(5),
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn rescan_after_worker_stopped_is_unavailable() -> Result<()> {
    let mut harness = Harness::new().await?;
    if let Some(watcher) = harness.watcher.take() {
        watcher.shutdown(Duration::from_secs(1)).await;
    }
    let (status, body) = harness.get_json("/api/rescan").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn health_and_debug_report_scan_state() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, health) = harness.get_json("/healthz").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["packs"], 2);
    assert!(health["last_scan"].is_string());
    assert!(health["last_error"].is_null());

    let (status, debug) = harness.get_json("/debug").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(debug["pack_count"], 2);
    assert_eq!(debug["completed_scans"], 1);
    assert_eq!(debug["config"]["server"]["port"], 8080);
    assert!(debug["endpoints"].as_array().is_some_and(|list| !list.is_empty()));
    assert!(debug["version"].is_string());
    Ok(())
}

#[tokio::test]
async fn health_is_degraded_after_failed_scan() -> Result<()> {
    let harness = Harness::new().await?;
    fs::remove_dir_all(harness.registry.root_directory())?;
    assert!(harness.registry.rescan_blocking().is_err());

    let (_, health) = harness.get_json("/healthz").await?;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["packs"], 2);
    assert!(health["last_error"].is_string());
    Ok(())
}

#[tokio::test]
async fn index_page_lists_packs() -> Result<()> {
    let harness = Harness::new().await?;
    let (status, body, headers) = harness.request(Method::GET, "/").await?;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()?
            .starts_with("text/html")
    );
    let page = String::from_utf8(body)?;
    assert!(page.contains("href=\"/download/foo\""));
    assert!(page.contains("href=\"/download/bar\""));
    Ok(())
}

#[tokio::test]
async fn encoded_links_resolve_to_the_pack() -> Result<()> {
    let harness = Harness::new().await?;
    write_zip(
        &harness.registry.root_directory().join("odd name #1.zip"),
        &[("pack.mcmeta", br#"{"pack":{"description":"Odd","pack_format":6}}"#)],
    )?;
    harness.registry.rescan_blocking()?;

    let (_, body) = harness.get_json("/api/packs/odd%20name%20%231").await?;
    let download = body["data"]["download_url"].as_str().expect("download url");
    assert_eq!(download, "/download/odd%20name%20%231");
    assert_eq!(body["data"]["hash_url"], "/hash/odd%20name%20%231");

    let (status, bytes, _) = harness.request(Method::GET, download).await?;
    assert_eq!(status, StatusCode::OK);
    let on_disk = fs::read(&harness.registry.get("odd name #1").expect("indexed").source_path)?;
    assert_eq!(bytes, on_disk);

    let (_, page, _) = harness.request(Method::GET, "/").await?;
    assert!(String::from_utf8(page)?.contains("href=\"/download/odd%20name%20%231\""));
    Ok(())
}

fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let mut writer = zip::ZipWriter::new(File::create(path)?);
    for (name, data) in entries {
        writer.start_file(*name, FileOptions::default())?;
        writer.write_all(data)?;
    }
    writer.finish()?;
    Ok(())
}

async fn wait_for<F>(mut predicate: F, timeout: Duration) -> Result<()>
where
    F: FnMut() -> bool,
{
    let step = Duration::from_millis(50);
    let mut elapsed = Duration::ZERO;
    while elapsed < timeout {
        if predicate() {
            return Ok(());
        }
        tokio::time::sleep(step).await;
        elapsed += step;
    }
    anyhow::bail!("condition not met within {:?}", timeout);
}
