//! File System Helpers
//!
//! Scoped ownership of the files a build creates: cache file names that do
//! not collide across concurrent builds, temp files removed on every exit
//! path, outputs that disappear unless the build commits them, and writes
//! that land atomically.

use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::PlatformResult;

static CACHE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Append `suffix` to the full file name: `model.nxz` + `.tmp.nxs`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Case-insensitive extension test
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Process-unique base path for cache files.
///
/// Combines the process id, a per-process sequence number and the clock so
/// that builds running concurrently in one directory never share a name.
pub fn cache_base_name(dir: Option<&Path>) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let sequence = CACHE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let name = format!("nxs_cache_{}_{}_{}", std::process::id(), sequence, nanos);

    match dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Remove a file, treating "already gone" as success.
///
/// Returns whether a file was actually removed.
pub fn remove_if_exists(path: &Path) -> PlatformResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Write a file through `<path>.part` and rename it into place.
///
/// On failure the partial file is removed and `path` is left untouched.
pub fn write_atomically<E, F>(path: &Path, write: F) -> Result<(), E>
where
    E: From<std::io::Error>,
    F: FnOnce(&mut BufWriter<File>) -> Result<(), E>,
{
    let part = with_suffix(path, ".part");
    let result: Result<(), E> = (|| {
        let mut writer = BufWriter::new(File::create(&part)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        std::fs::rename(&part, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

/// Removes a temporary file when dropped
#[derive(Debug)]
pub struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    /// Take ownership of the file at `path` (it need not exist yet)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the guarded path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        match remove_if_exists(&self.path) {
            Ok(true) => log::debug!("Removed temporary file {}", self.path.display()),
            Ok(false) => {}
            Err(e) => log::warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}

/// Removes an output file when dropped, unless committed
#[derive(Debug)]
pub struct OutputGuard {
    path: PathBuf,
    committed: bool,
}

impl OutputGuard {
    /// Guard the output about to be written at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            committed: false,
        }
    }

    /// Get the guarded path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the output
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match remove_if_exists(&self.path) {
            Ok(true) => log::warn!("Removed incomplete output {}", self.path.display()),
            Ok(false) => {}
            Err(e) => log::warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}
