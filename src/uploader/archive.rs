use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, HeaderMode};
use tracing::{debug, warn};

/// Suffix of files still being written by the persistence registry.
pub const TEMP_EXTENSION: &str = "tmp";

/// Filesystem packing primitives used by the upload cycle.
///
/// All methods block; the pipeline calls them from `spawn_blocking`.
pub trait ArchiveBuilder: Send + Sync {
    /// Every regular file under `folder`, recursively, in a stable order.
    /// In-progress `*.tmp` writes are left out.
    fn collect_files(&self, folder: &Path) -> io::Result<Vec<PathBuf>>;

    /// Pack `files` into a single container at `container`. Entry names are
    /// relative to `root`. Returns the files actually packed; a file that
    /// disappeared since it was collected is skipped.
    fn create_container(&self, container: &Path, root: &Path, files: &[PathBuf]) -> io::Result<Vec<PathBuf>>;

    fn compress(&self, container: &Path, compressed: &Path) -> io::Result<()>;

    /// Delete `files`, then any directory under `root` left empty.
    /// Keeps going past individual failures and reports the first one.
    fn purge(&self, root: &Path, files: &[PathBuf]) -> io::Result<()>;
}

/// tar + gzip implementation.
#[derive(Debug, Clone)]
pub struct TarGzArchiver {
    level: Compression,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder for TarGzArchiver {
    fn collect_files(&self, folder: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        walk(folder, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn create_container(&self, container: &Path, root: &Path, files: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
        let mut builder = Builder::new(BufWriter::new(File::create(container)?));
        // Zeroed mtimes and owners: same inputs, same bytes.
        builder.mode(HeaderMode::Deterministic);

        let mut packed = Vec::with_capacity(files.len());
        for file in files {
            // Header and contents both come from the open handle, so a rename
            // after this point cannot fail the append.
            let mut handle = match File::open(file) {
                Ok(handle) => handle,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} vanished before packing", file.display());
                    continue;
                }
                Err(e) => return Err(e),
            };
            let name = file.strip_prefix(root).unwrap_or(file);
            builder.append_file(name, &mut handle)?;
            packed.push(file.clone());
        }

        let mut writer = builder.into_inner()?;
        io::Write::flush(&mut writer)?;
        debug!("Packed {} files into {}", packed.len(), container.display());
        Ok(packed)
    }

    fn compress(&self, container: &Path, compressed: &Path) -> io::Result<()> {
        let mut input = BufReader::new(File::open(container)?);
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(compressed)?), self.level);
        io::copy(&mut input, &mut encoder)?;
        let mut writer = encoder.finish()?;
        io::Write::flush(&mut writer)?;
        Ok(())
    }

    fn purge(&self, root: &Path, files: &[PathBuf]) -> io::Result<()> {
        let mut first_error = None;

        for file in files {
            match fs::remove_file(file) {
                Ok(()) => {}
                // Already gone; nothing to reclaim.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete {}: {}", file.display(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Err(e) = prune_empty_dirs(root, root) {
            warn!("Failed to prune empty folders under {}: {}", root.display(), e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk(&entry.path(), files)?;
        } else if file_type.is_file() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                continue;
            }
            files.push(path);
        }
    }
    Ok(())
}

/// Remove empty directories below `dir`, never `root` itself.
fn prune_empty_dirs(dir: &Path, root: &Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            let path = entry.path();
            if prune_empty_dirs(&path, root)? {
                fs::remove_dir(&path)?;
                continue;
            }
        }
        empty = false;
    }
    Ok(empty && dir != root)
}
