use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{RegistryError, Result};
use crate::index::Index;
use crate::loader::{CandidateKind, load_candidate};
use crate::pack::has_archive_extension;

/// Walk `root` once and build a complete replacement index.
///
/// Candidates are loaded in a fixed group order: the root itself, then every
/// subdirectory, then every archive file. When two candidates share a name the
/// later one wins, so an archive shadows a directory of the same name.
/// Failing candidates are logged and skipped; only an unreadable root fails
/// the scan.
pub fn scan(root: &Path) -> Result<Index> {
    let started = Instant::now();
    tracing::debug!(root = %root.display(), "scanning pack directory");

    let (directories, archives) = enumerate_children(root)?;
    let mut index = Index::empty();
    let mut add = |path: &Path, kind: CandidateKind| match load_candidate(path, kind) {
        Ok(Some(pack)) => {
            tracing::debug!(pack = %pack.name, kind = pack.kind.label(), "found pack");
            let name = pack.name.clone();
            if let Some(shadowed) = index.insert(pack) {
                tracing::warn!(
                    pack = %name,
                    replaced = %shadowed.source_path.display(),
                    by = %path.display(),
                    "duplicate pack name, keeping the later candidate"
                );
            }
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "skipping unreadable pack candidate");
        }
    };

    add(root, CandidateKind::Directory);
    for dir in &directories {
        add(dir, CandidateKind::Directory);
    }
    for archive in &archives {
        add(archive, CandidateKind::Archive);
    }

    tracing::info!(
        root = %root.display(),
        count = index.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "pack scan complete"
    );
    Ok(index)
}

/// Immediate subdirectories and archive files of `root`, in enumeration order.
fn enumerate_children(root: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let read_root = |source| RegistryError::ReadRoot {
        path: root.to_path_buf(),
        source,
    };
    let mut directories = Vec::new();
    let mut archives = Vec::new();
    for entry in fs::read_dir(root).map_err(read_root)? {
        let entry = entry.map_err(read_root)?;
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat directory entry");
                continue;
            }
        };
        if file_type.is_dir() {
            directories.push(path);
        } else if file_type.is_file() && has_archive_extension(&path) {
            archives.push(path);
        }
    }
    Ok((directories, archives))
}
