//! Durable store: co-located temp file, fsync, atomic rename.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwapOption;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::artifact::{CacheArtifact, CacheStore};
use crate::error::StoreError;

/// Suffix of in-progress temp files.
const TEMP_SUFFIX: &str = ".tmp";

/// File-backed [`CacheStore`].
///
/// The canonical file is only ever replaced by `rename(2)` of a fully
/// written and fsynced sibling, so other processes reading the path see the
/// old or the new document, never a mix. In-process readers are served from
/// an [`ArcSwapOption`] updated after the rename succeeds.
#[allow(clippy::module_name_repetitions)]
pub struct FileCacheStore {
    path: PathBuf,
    dir: PathBuf,
    temp_prefix: String,
    published: ArcSwapOption<CacheArtifact>,
    write_lock: Mutex<()>,
}

impl fmt::Debug for FileCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCacheStore")
            .field("path", &self.path)
            .field("published", &self.published.load().as_ref().map(|a| a.len()))
            .finish_non_exhaustive()
    }
}

impl FileCacheStore {
    /// Opens the store at `path`.
    ///
    /// Creates the parent directory, removes temp files left behind by an
    /// interrupted write, and loads an existing artifact. A missing or empty
    /// file leaves the store empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Load`] if the directory cannot be created or an
    /// existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Err(StoreError::load(
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            ));
        };
        let temp_prefix = format!(".{file_name}.");
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        fs::create_dir_all(&dir).map_err(|e| StoreError::load(&dir, e))?;
        remove_stale_temps(&dir, &temp_prefix);
        let existing = load_existing(&path)?;

        if let Some(artifact) = &existing {
            tracing::info!(
                path = %path.display(),
                bytes = artifact.len(),
                generated_at = %artifact.generated_at(),
                "Loaded persisted artifact"
            );
        } else {
            tracing::info!(path = %path.display(), "No persisted artifact, starting empty");
        }

        Ok(Self {
            path,
            dir,
            temp_prefix,
            published: ArcSwapOption::new(existing.map(Arc::new)),
            write_lock: Mutex::new(()),
        })
    }

    /// Canonical artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, bytes: &[u8]) -> io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(&self.temp_prefix)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        // Make the rename itself durable.
        if let Err(e) = fs::File::open(&self.dir).and_then(|d| d.sync_all()) {
            tracing::debug!(dir = %self.dir.display(), error = %e, "Directory fsync failed");
        }
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn write(&self, bytes: Bytes) -> Result<Arc<CacheArtifact>, StoreError> {
        if bytes.is_empty() {
            return Err(StoreError::EmptyArtifact);
        }

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.persist(&bytes)
            .map_err(|e| StoreError::write_failure(&self.path, e))?;

        let artifact = Arc::new(CacheArtifact::new(bytes, Utc::now()));
        self.published.store(Some(Arc::clone(&artifact)));
        tracing::info!(
            path = %self.path.display(),
            bytes = artifact.len(),
            "Artifact published"
        );
        Ok(artifact)
    }

    fn read(&self) -> Option<Arc<CacheArtifact>> {
        self.published.load_full()
    }
}

/// Removes `{prefix}*.tmp` files in `dir`. Failures are logged only.
fn remove_stale_temps(dir: &Path, prefix: &str) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot scan for stale temp files");
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !(name.starts_with(prefix) && name.ends_with(TEMP_SUFFIX)) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(()) => tracing::info!(file = %name, "Removed stale temp file"),
            Err(e) => tracing::warn!(file = %name, error = %e, "Failed to remove stale temp file"),
        }
    }
}

/// Reads a previously persisted artifact, if any.
fn load_existing(path: &Path) -> Result<Option<CacheArtifact>, StoreError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::load(path, e)),
    };
    if data.is_empty() {
        tracing::warn!(path = %path.display(), "Ignoring empty persisted artifact");
        return Ok(None);
    }

    let generated_at = fs::metadata(path)
        .and_then(|m| m.modified())
        .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);

    Ok(Some(CacheArtifact::new(Bytes::from(data), generated_at)))
}
