//! Content fingerprints for archive files and directory trees.
//!
//! Archives are hashed over their bytes. Directory trees are hashed over a
//! sorted listing of `relative/path:mtime:size` lines, so a content edit that
//! keeps both size and mtime intact produces the same tree fingerprint.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::SystemTime;

use md5::{Digest, Md5};
use walkdir::WalkDir;

use crate::error::{RegistryError, Result};
use crate::pack::unix_seconds;

const BUF_SIZE: usize = 64 * 1024;

/// Lowercase hex MD5 digest identifying a pack's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn algorithm(&self) -> &'static str {
        "MD5"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(bytes)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of a single walk over a directory tree.
#[derive(Debug, Clone)]
pub struct TreeSummary {
    pub fingerprint: Fingerprint,
    pub total_bytes: u64,
    pub file_count: usize,
    /// Newest mtime among regular files; `None` for a tree without files.
    pub newest_modified: Option<SystemTime>,
}

/// Stream a file through MD5.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path).map_err(|err| RegistryError::io(path, err))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Md5::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|err| RegistryError::io(path, err))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(Fingerprint(hex::encode(hasher.finalize())))
}

/// Metadata fingerprint of every regular file below `root`.
pub fn fingerprint_tree(root: &Path) -> Result<Fingerprint> {
    tree_summary(root).map(|summary| summary.fingerprint)
}

/// Walk `root` once, producing its fingerprint, byte size and newest mtime.
pub fn tree_summary(root: &Path) -> Result<TreeSummary> {
    let mut lines = Vec::new();
    let mut total_bytes = 0u64;
    let mut newest_modified: Option<SystemTime> = None;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            RegistryError::walk(path, err)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry
            .metadata()
            .map_err(|err| RegistryError::walk(entry.path(), err))?;
        let modified = metadata
            .modified()
            .map_err(|err| RegistryError::io(entry.path(), err))?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());

        lines.push(format!(
            "{}:{}:{}",
            relative_key(relative),
            unix_seconds(modified),
            metadata.len()
        ));
        total_bytes += metadata.len();
        newest_modified = newest_modified.max(Some(modified));
    }

    Ok(TreeSummary {
        file_count: lines.len(),
        fingerprint: digest_lines(lines),
        total_bytes,
        newest_modified,
    })
}

/// Sort, newline-join and hash per-file lines.
pub(crate) fn digest_lines(mut lines: Vec<String>) -> Fingerprint {
    lines.sort();
    Fingerprint::of_bytes(lines.join("\n").as_bytes())
}

/// Relative path with `/` separators regardless of platform.
pub(crate) fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
