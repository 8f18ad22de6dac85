//! Persistence of the last successful status snapshot.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{error::StoreError, models::StatusSnapshot};

/// Storage for the "current" snapshot shared by the poller and the commands.
pub trait CacheStore: Send + Sync {
    /// Durably record `snapshot` as the latest one.
    fn put(&self, snapshot: &StatusSnapshot) -> Result<(), StoreError>;

    /// Return the most recently stored snapshot.
    fn latest(&self) -> Result<StatusSnapshot, StoreError>;
}

/// JSON file holding exactly one snapshot, replaced on every `put`.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the target, so readers observe either the old or the new snapshot.
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl CacheStore for FileCacheStore {
    fn put(&self, snapshot: &StatusSnapshot) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| self.io_error(err))?;

        let serialized = serde_json::to_vec_pretty(snapshot)
            .map_err(|err| StoreError::Corrupt(format!("failed to serialize snapshot: {err}")))?;

        let mut staging = NamedTempFile::new_in(&parent).map_err(|err| self.io_error(err))?;
        staging
            .write_all(&serialized)
            .and_then(|_| staging.as_file().sync_all())
            .map_err(|err| self.io_error(err))?;
        staging
            .persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;

        debug!("cached snapshot written to {}", self.path.display());
        Ok(())
    }

    fn latest(&self) -> Result<StatusSnapshot, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(err) => return Err(self.io_error(err)),
        };
        serde_json::from_str(&contents).map_err(|err| {
            StoreError::Corrupt(format!("failed to parse {}: {err}", self.path.display()))
        })
    }
}

/// In-process store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryCacheStore {
    current: RwLock<Option<StatusSnapshot>>,
}

impl MemoryCacheStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn put(&self, snapshot: &StatusSnapshot) -> Result<(), StoreError> {
        *self.current.write() = Some(snapshot.clone());
        Ok(())
    }

    fn latest(&self) -> Result<StatusSnapshot, StoreError> {
        self.current.read().clone().ok_or(StoreError::NotFound)
    }
}
