//! Persistent snapshots of the url table and resource store.
//!
//! ```text
//! <storage_path>/
//! ├── urls.json        # UrlSnapshot
//! └── resources.json   # ResourceSnapshot
//! ```
//!
//! A missing or unreadable snapshot is treated as absent; the service then
//! rebuilds from the source.

mod fingerprint;

pub use fingerprint::fingerprint;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::debug;

/// Which snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Urls,
    Resources,
}

impl CacheKind {
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Urls => "urls.json",
            Self::Resources => "resources.json",
        }
    }
}

/// Snapshot files in a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileCache {
    storage_path: PathBuf,
    write_disabled: bool,
}

impl LocalFileCache {
    pub fn new(storage_path: impl Into<PathBuf>, write_disabled: bool) -> Self {
        Self {
            storage_path: storage_path.into(),
            write_disabled,
        }
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn write_disabled(&self) -> bool {
        self.write_disabled
    }

    pub fn path(&self, kind: CacheKind) -> PathBuf {
        self.storage_path.join(kind.file_name())
    }

    /// Read a snapshot. Missing or corrupt files yield `None`.
    pub async fn read<T: DeserializeOwned>(&self, kind: CacheKind) -> Option<T> {
        let path = self.path(kind);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("persist"; "failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!("persist"; "failed to deserialize {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Write a snapshot, creating the directory as needed.
    pub async fn write<T: Serialize>(&self, kind: CacheKind, data: &T) -> std::io::Result<()> {
        if self.write_disabled {
            debug!("persist"; "write disabled, skipping {}", kind.file_name());
            return Ok(());
        }

        let path = self.path(kind);
        let json = serde_json::to_vec_pretty(data)?;
        tokio::fs::create_dir_all(&self.storage_path).await?;
        tokio::fs::write(&path, json).await.map_err(|e| {
            debug!("persist"; "failed to write {}: {}", path.display(), e);
            e
        })?;

        debug!("persist"; "saved {}", path.display());
        Ok(())
    }
}
