use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fingerprint::Fingerprint;

/// Manifest file that marks a directory as a pack.
pub const MANIFEST_FILE: &str = "pack.mcmeta";

/// Format version reported when a pack does not declare one.
pub const DEFAULT_PACK_FORMAT: u32 = 22;

/// Extension (without the dot) of archive packs.
pub(crate) const ARCHIVE_EXTENSION: &str = "zip";

/// Storage layout of a pack on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackKind {
    Archive,
    Directory,
}

impl PackKind {
    pub fn is_directory(self) -> bool {
        matches!(self, Self::Directory)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Directory => "directory",
        }
    }
}

/// Immutable record describing one discovered pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    pub name: String,
    pub source_path: PathBuf,
    pub description: String,
    pub format_version: u32,
    pub size_bytes: u64,
    pub fingerprint: Fingerprint,
    pub last_modified: SystemTime,
    pub kind: PackKind,
}

impl Pack {
    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    /// Seconds since the Unix epoch of the newest modification seen at scan time.
    pub fn last_modified_unix(&self) -> i64 {
        unix_seconds(self.last_modified)
    }
}

pub(crate) fn default_description(name: &str) -> String {
    format!("Resource Pack: {name}")
}

/// Signed seconds relative to the Unix epoch (pre-epoch times are negative).
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

pub(crate) fn has_archive_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
        .unwrap_or(false)
}
