//! Pack registry core for the resource pack server.
//!
//! This crate discovers resource packs (zip archives and directories carrying a
//! `pack.mcmeta` manifest) under a root directory, fingerprints them, keeps an
//! atomically swapped in-memory index in sync with the filesystem, and builds
//! downloadable archives for directory packs on demand.

#![forbid(unsafe_code)]

pub mod archive;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod scanner;
pub mod watcher;

mod pack;

pub use archive::ArchiveCache;
pub use error::{RegistryError, Result};
pub use fingerprint::{Fingerprint, TreeSummary, fingerprint_file, fingerprint_tree};
pub use index::{Index, IndexDiff};
pub use loader::{CandidateKind, load_candidate};
pub use manifest::{PackMeta, parse_manifest};
pub use pack::{DEFAULT_PACK_FORMAT, MANIFEST_FILE, Pack, PackKind};
pub use registry::{Registry, ScanStatus};
pub use scanner::scan;
pub use watcher::{PackWatcher, RescanHandle, WatchConfig, start_pack_watcher};
