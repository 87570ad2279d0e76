//! Directory-backed cache: one file per key.

use anyhow::{Context, Result};
use log::debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DatabaseError;
use crate::runtime::Runtime;

use super::Cache;

/// Stores each entry in `<dir>/<key>.json`.
///
/// Keys are fetcher keys (hex digests), so they are always valid file names.
pub struct FileCache<R: Runtime> {
    runtime: R,
    dir: PathBuf,
    closed: AtomicBool,
}

impl<R: Runtime> FileCache<R> {
    /// Open the cache rooted at `dir`, creating the directory if needed.
    pub fn open(runtime: R, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !runtime.exists(&dir) {
            runtime
                .create_dir_all(&dir)
                .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        }
        debug!("Opened cache at {}", dir.display());

        Ok(Self {
            runtime,
            dir,
            closed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DatabaseError::CacheClosed.into());
        }
        Ok(())
    }
}

impl<R: Runtime> Cache for FileCache<R> {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;

        let path = self.entry_path(key);
        if !self.runtime.exists(&path) {
            return Ok(None);
        }
        self.runtime.read(&path).map(Some)
    }

    #[tracing::instrument(skip(self, value))]
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.ensure_open()?;

        let path = self.entry_path(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        self.runtime.write(&tmp, value)?;
        if let Err(e) = self.runtime.rename(&tmp, &path) {
            if let Err(cleanup) = self.runtime.remove_file(&tmp) {
                debug!("Failed to remove {}: {:#}", tmp.display(), cleanup);
            }
            return Err(e).with_context(|| format!("Failed to store cache entry {}", path.display()));
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
