//! Per-TV-type configuration store
//!
//! Holds one JSON blob per [`TvKind`]. Writes are whole-blob snapshots, so
//! the last writer wins and no cross-process locking is attempted.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::error::{RemoteError, Result};
use crate::types::{ConnectionConfig, TvKind};

pub trait ConfigStore: Send + Sync {
    fn load(&self, kind: TvKind) -> Result<Option<ConnectionConfig>>;
    fn save(&self, config: &ConnectionConfig) -> Result<()>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<TvKind, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw blob as last saved
    pub fn blob(&self, kind: TvKind) -> Option<Value> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
    }
}

impl ConfigStore for MemoryStore {
    fn load(&self, kind: TvKind) -> Result<Option<ConnectionConfig>> {
        self.blob(kind)
            .map(|blob| ConnectionConfig::from_blob(kind, blob))
            .transpose()
    }

    fn save(&self, config: &ConnectionConfig) -> Result<()> {
        let blob = config.to_blob()?;
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(config.kind(), blob);
        Ok(())
    }
}

/// One `<kind>.json` file per TV type
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Store under the platform config directory (`~/.config/tvlink` on Linux)
    pub fn new() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| RemoteError::Store("no config directory on this platform".into()))?;
        Ok(Self::at(base.join("tvlink")))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, kind: TvKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.as_str()))
    }
}

impl ConfigStore for FileStore {
    fn load(&self, kind: TvKind) -> Result<Option<ConnectionConfig>> {
        let path = self.path(kind);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        let blob: Value = serde_json::from_str(&text)?;
        ConnectionConfig::from_blob(kind, blob).map(Some)
    }

    fn save(&self, config: &ConnectionConfig) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(config.kind());
        let text = serde_json::to_string_pretty(&config.to_blob()?)?;
        fs::write(&path, text)?;
        debug!("Saved {} config to {}", config.kind(), path.display());
        Ok(())
    }
}
