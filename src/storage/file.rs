//! File-based storage for pathgate.
//!
//! The whole dataset is one JSON document, `~/.pathgate/data.json` by
//! default. Atomic writes are achieved via temp file + rename pattern, and
//! writers in different processes take turns through a lock file next to
//! the document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::default_data_path;
use crate::error::{PathgateError, Result};
use crate::storage::{Dataset, DocumentStore};

/// How long a writer waits for another process to release the lock file.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// A lock file older than this was left behind by a crashed writer.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// Exclusive lock held for as long as its file exists.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Create the lock file, waiting while another writer holds it.
    fn acquire(path: PathBuf) -> Result<Self> {
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&path) {
                        tracing::warn!(path = %path.display(), "removing stale lock file");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(PathgateError::storage(
                            &path,
                            io::Error::new(
                                io::ErrorKind::WouldBlock,
                                "data document is locked by another writer",
                            ),
                        ));
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => return Err(PathgateError::storage(&path, e)),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// File-based storage.
///
/// Every write loads the document, applies the change and replaces the file
/// atomically. A mutex serializes writers sharing this handle; the lock file
/// serializes handles and processes.
#[derive(Debug)]
pub struct FileStore {
    /// Path of the JSON document.
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a file store at the default location.
    ///
    /// Uses `~/.pathgate/data.json` or `$PATHGATE_HOME/data.json`.
    pub fn new() -> Result<Self> {
        let path = default_data_path().ok_or_else(|| {
            PathgateError::config("Could not determine data file (no home directory)")
        })?;
        Self::with_path(path)
    }

    /// Create a file store for a specific document path.
    ///
    /// The parent directory is created when missing.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| PathgateError::storage(parent, e))?;
            }
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path for a temp file used during atomic writes.
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "data.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    /// Get the path of the cross-process write lock.
    fn lock_path(&self) -> PathBuf {
        let mut path = self.temp_path();
        path.set_extension("lock");
        path
    }

    /// Read the document; a missing file is an empty dataset.
    fn load(&self) -> Result<Dataset> {
        if !self.path.exists() {
            return Ok(Dataset::default());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| PathgateError::storage(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Dataset::default());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Write the document atomically using temp file + rename.
    fn atomic_write(&self, data: &Dataset) -> Result<()> {
        let temp_path = self.temp_path();
        let json = serde_json::to_string_pretty(data)?;

        {
            let mut file =
                fs::File::create(&temp_path).map_err(|e| PathgateError::storage(&temp_path, e))?;
            file.write_all(json.as_bytes())
                .map_err(|e| PathgateError::storage(&temp_path, e))?;
            file.sync_all()
                .map_err(|e| PathgateError::storage(&temp_path, e))?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| PathgateError::storage(&self.path, e))?;

        Ok(())
    }
}

impl DocumentStore for FileStore {
    fn read_document<R>(&self, f: impl FnOnce(&Dataset) -> Result<R>) -> Result<R> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PathgateError::invalid_state("file store lock poisoned"))?;
        let data = self.load()?;
        f(&data)
    }

    fn write_document<R>(&self, f: impl FnOnce(&mut Dataset) -> Result<R>) -> Result<R> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| PathgateError::invalid_state("file store lock poisoned"))?;
        let _lock = LockFile::acquire(self.lock_path())?;
        let mut data = self.load()?;
        let result = f(&mut data)?;
        self.atomic_write(&data)?;
        Ok(result)
    }
}
