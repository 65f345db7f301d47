use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::error::{RegistryError, Result};
use crate::fingerprint::{fingerprint_file, tree_summary};
use crate::manifest::{MAX_MANIFEST_BYTES, PackMeta, parse_manifest};
use crate::pack::{DEFAULT_PACK_FORMAT, MANIFEST_FILE, Pack, PackKind, default_description};

/// How a scan candidate is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Directory,
    Archive,
}

/// Load a candidate path into a [`Pack`].
///
/// Returns `Ok(None)` when the path is not a pack at all (a directory without
/// a top-level manifest). I/O failures are returned so the caller can skip
/// just this candidate.
pub fn load_candidate(path: &Path, kind: CandidateKind) -> Result<Option<Pack>> {
    match kind {
        CandidateKind::Directory => load_directory(path),
        CandidateKind::Archive => load_archive(path).map(Some),
    }
}

/// Whether `dir` carries a manifest at its top level.
pub fn is_pack_directory(dir: &Path) -> Result<bool> {
    let manifest = dir.join(MANIFEST_FILE);
    match fs::metadata(&manifest) {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(RegistryError::io(manifest, err)),
    }
}

fn load_directory(dir: &Path) -> Result<Option<Pack>> {
    if !is_pack_directory(dir)? {
        return Ok(None);
    }
    let name = directory_name(dir)?;
    let manifest_path = dir.join(MANIFEST_FILE);
    let bytes = read_capped(&manifest_path).map_err(|err| RegistryError::io(&manifest_path, err))?;
    let meta = parse_manifest(&bytes);
    if meta.is_none() {
        tracing::debug!(pack = %name, "manifest unreadable, using defaults");
    }

    let summary = tree_summary(dir)?;
    let dir_modified = fs::metadata(dir)
        .and_then(|meta| meta.modified())
        .map_err(|err| RegistryError::io(dir, err))?;
    let last_modified = summary
        .newest_modified
        .map_or(dir_modified, |newest| newest.max(dir_modified));

    let (description, format_version) = resolve_meta(&name, meta);
    Ok(Some(Pack {
        source_path: dir.to_path_buf(),
        description,
        format_version,
        size_bytes: summary.total_bytes,
        fingerprint: summary.fingerprint,
        last_modified,
        kind: PackKind::Directory,
        name,
    }))
}

fn load_archive(path: &Path) -> Result<Pack> {
    let stat = fs::metadata(path).map_err(|err| RegistryError::io(path, err))?;
    let last_modified = stat.modified().map_err(|err| RegistryError::io(path, err))?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let meta = read_archive_manifest(path);
    let fingerprint = fingerprint_file(path)?;
    let (description, format_version) = resolve_meta(&name, meta);
    Ok(Pack {
        source_path: path.to_path_buf(),
        description,
        format_version,
        size_bytes: stat.len(),
        fingerprint,
        last_modified,
        kind: PackKind::Archive,
        name,
    })
}

/// Best-effort manifest lookup inside a zip; every failure means "absent".
fn read_archive_manifest(path: &Path) -> Option<PackMeta> {
    let file = File::open(path).ok()?;
    let mut archive = match ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "archive unreadable, using default metadata");
            return None;
        }
    };
    let mut entry = archive.by_name(MANIFEST_FILE).ok()?;
    let mut bytes = Vec::new();
    (&mut entry)
        .take(MAX_MANIFEST_BYTES)
        .read_to_end(&mut bytes)
        .ok()?;
    parse_manifest(&bytes)
}

fn read_capped(path: &Path) -> io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)?
        .take(MAX_MANIFEST_BYTES)
        .read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// A usable manifest without a textual description yields an empty one; the
/// synthesized description is reserved for a missing or unparseable manifest.
fn resolve_meta(name: &str, meta: Option<PackMeta>) -> (String, u32) {
    match meta {
        Some(meta) => (
            meta.description.unwrap_or_default(),
            meta.pack_format.unwrap_or(DEFAULT_PACK_FORMAT),
        ),
        None => (default_description(name), DEFAULT_PACK_FORMAT),
    }
}

fn directory_name(dir: &Path) -> Result<String> {
    if let Some(name) = dir.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }
    let canonical = fs::canonicalize(dir).map_err(|err| RegistryError::io(dir, err))?;
    Ok(canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string()))
}
