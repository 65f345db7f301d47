use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{RegistryError, Result};
use crate::fingerprint::relative_key;
use crate::pack::{Pack, PackKind, unix_seconds};

const CACHE_DIR_NAME: &str = "resourcepack_server";

/// Builds downloadable archives for directory packs.
///
/// Every directory download gets a fresh `<name>_<unix>.zip` file; nothing is
/// reused or cleaned up here.
#[derive(Debug, Clone)]
pub struct ArchiveCache {
    dir: PathBuf,
}

impl ArchiveCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| RegistryError::io(&dir, err))?;
        Ok(Self { dir })
    }

    /// Cache under the process temp directory.
    pub fn in_temp_dir() -> Result<Self> {
        Self::new(std::env::temp_dir().join(CACHE_DIR_NAME))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a servable zip for `pack`, building one for directory packs.
    pub fn materialize(&self, pack: &Pack) -> Result<PathBuf> {
        match pack.kind {
            PackKind::Archive => Ok(pack.source_path.clone()),
            PackKind::Directory => self.build(pack),
        }
    }

    fn build(&self, pack: &Pack) -> Result<PathBuf> {
        let (path, file) = self.create_unique(&pack.name)?;
        match write_tree(&pack.source_path, &path, file) {
            Ok(entries) => {
                tracing::info!(pack = %pack.name, path = %path.display(), entries, "built temporary archive");
                Ok(path)
            }
            Err(err) => {
                if let Err(cleanup) = fs::remove_file(&path) {
                    tracing::debug!(path = %path.display(), error = %cleanup, "partial archive left behind");
                }
                Err(err)
            }
        }
    }

    fn create_unique(&self, name: &str) -> Result<(PathBuf, File)> {
        let stamp = unix_seconds(SystemTime::now());
        let mut attempt = 0u32;
        loop {
            let file_name = if attempt == 0 {
                format!("{name}_{stamp}.zip")
            } else {
                format!("{name}_{stamp}_{attempt}.zip")
            };
            let path = self.dir.join(file_name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(RegistryError::io(path, err)),
            }
        }
    }
}

/// Zip every regular file under `root` into `file`, returning the entry count.
fn write_tree(root: &Path, dest: &Path, file: File) -> Result<usize> {
    let archive_err = |source| RegistryError::Archive {
        path: dest.to_path_buf(),
        source,
    };
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let mut entries = 0;

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            RegistryError::walk(path, err)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let size = entry
            .metadata()
            .map_err(|err| RegistryError::walk(entry.path(), err))?
            .len();
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(size >= u64::from(u32::MAX));
        writer
            .start_file(relative_key(relative), options)
            .map_err(archive_err)?;
        let mut source = File::open(entry.path()).map_err(|err| RegistryError::io(entry.path(), err))?;
        io::copy(&mut source, &mut writer).map_err(|err| RegistryError::io(entry.path(), err))?;
        entries += 1;
    }

    let mut inner = writer.finish().map_err(archive_err)?;
    inner.flush().map_err(|err| RegistryError::io(dest, err))?;
    Ok(entries)
}
