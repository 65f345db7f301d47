use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use pack_registry::{ArchiveCache, PackKind, Registry, WatchConfig, start_pack_watcher};
use serial_test::serial;
use tokio::time::sleep;
use zip::write::FileOptions;

#[tokio::test]
async fn end_to_end_scan_and_materialize() -> Result<()> {
    let root = tempfile::tempdir()?;
    let packs = root.path().join("packs");
    fs::create_dir_all(&packs)?;
    write_zip(
        &packs.join("foo.zip"),
        &[("pack.mcmeta", br#"{"pack":{"description":"Foo","pack_format":15}}"#)],
    )?;
    write_dir_pack(&packs, "bar", r#"{"pack":{"description":"Bar","pack_format":9}}"#)?;

    let registry = Registry::new(&packs);
    registry.rescan_blocking()?;
    assert_eq!(registry.len(), 2);

    let foo = registry.get("foo").expect("foo indexed");
    assert_eq!(foo.kind, PackKind::Archive);
    assert_eq!(foo.format_version, 15);
    assert_eq!(foo.description, "Foo");
    let bar = registry.get("bar").expect("bar indexed");
    assert_eq!(bar.kind, PackKind::Directory);
    assert_eq!(bar.format_version, 9);
    assert_eq!(bar.description, "Bar");

    let cache = ArchiveCache::new(root.path().join("cache"))?;
    let first = cache.materialize(&bar)?;
    let second = cache.materialize(&bar)?;
    assert_ne!(first, second);
    assert!(first.is_file() && second.is_file());
    assert_eq!(cache.materialize(&foo)?, packs.join("foo.zip"));
    Ok(())
}

#[tokio::test]
async fn archive_without_manifest_gets_defaults() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_zip(&root.path().join("plain.zip"), &[("assets/readme.txt", b"hi")])?;
    fs::create_dir_all(root.path().join("no-manifest/assets"))?;

    let registry = Registry::new(root.path());
    registry.rescan_blocking()?;
    assert_eq!(registry.len(), 1);
    let plain = registry.get("plain").expect("plain indexed");
    assert_eq!(plain.description, "Resource Pack: plain");
    assert_eq!(plain.format_version, 22);
    assert!(registry.get("no-manifest").is_none());
    Ok(())
}

#[tokio::test]
#[serial]
async fn watcher_tracks_packs_added_and_removed_on_disk() -> Result<()> {
    let root = tempfile::tempdir()?;
    write_dir_pack(root.path(), "first", r#"{"pack":{"pack_format":9}}"#)?;
    let registry = Arc::new(Registry::new(root.path()));
    registry.rescan_blocking()?;

    let cfg = WatchConfig {
        enabled: true,
        settle_delay: Duration::from_millis(100),
        scan_cooldown: Duration::ZERO,
    };
    let (watcher, _rescan) = start_pack_watcher(Arc::clone(&registry), cfg);
    if !watcher.is_subscribed() {
        eprintln!("skipping watcher test: filesystem notifications unavailable");
        return Ok(());
    }

    write_zip(
        &root.path().join("second.zip"),
        &[("pack.mcmeta", br#"{"pack":{"pack_format":3}}"#)],
    )?;
    wait_for(|| registry.get("second").is_some(), Duration::from_secs(5)).await?;

    fs::remove_dir_all(root.path().join("first"))?;
    wait_for(|| registry.get("first").is_none(), Duration::from_secs(5)).await?;
    assert_eq!(registry.len(), 1);

    watcher.shutdown(Duration::from_secs(1)).await;
    Ok(())
}

#[tokio::test]
#[serial]
async fn disabled_monitor_waits_for_manual_rescan() -> Result<()> {
    let root = tempfile::tempdir()?;
    let registry = Arc::new(Registry::new(root.path()));
    registry.rescan_blocking()?;

    let cfg = WatchConfig {
        enabled: false,
        settle_delay: Duration::from_millis(10),
        scan_cooldown: Duration::from_secs(60),
    };
    let (watcher, rescan) = start_pack_watcher(Arc::clone(&registry), cfg);
    assert!(!watcher.is_subscribed());

    write_dir_pack(root.path(), "late", r#"{"pack":{"pack_format":4}}"#)?;
    sleep(Duration::from_millis(300)).await;
    assert!(registry.get("late").is_none());

    rescan.trigger()?;
    wait_for(|| registry.get("late").is_some(), Duration::from_secs(5)).await?;

    watcher.shutdown(Duration::from_secs(1)).await;
    Ok(())
}

fn write_dir_pack(root: &Path, name: &str, manifest: &str) -> Result<PathBuf> {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("assets"))?;
    fs::write(dir.join("pack.mcmeta"), manifest)?;
    fs::write(dir.join("assets/icon.png"), b"png-bytes")?;
    Ok(dir)
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
        sleep(step).await;
        elapsed += step;
    }
    bail!("condition not met within {:?}", timeout);
}
