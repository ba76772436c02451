//! Snapshot persistence.
//!
//! The store is a plain key/value contract: one opaque blob per backtest
//! name.  [`FileStore`] keeps each blob as `<name>.json` under a directory;
//! anything fancier (object store, database) just implements the trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bts_schemas::BrokerError;

/// External key/value store for session snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist `blob` under `name`, replacing any previous snapshot.
    async fn save(&self, name: &str, blob: &[u8]) -> Result<(), BrokerError>;

    /// Fetch the snapshot saved under `name`, if any.
    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, BrokerError>;
}

/// One JSON file per snapshot name.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BrokerError> {
        // Names become file names; keep them to a safe charset.
        let ok = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !ok {
            return Err(BrokerError::Persistence {
                detail: format!("invalid snapshot name: {name:?}"),
            });
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> BrokerError {
    BrokerError::Persistence {
        detail: format!("{}: {e}", path.display()),
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn save(&self, name: &str, blob: &[u8]) -> Result<(), BrokerError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))?;
        tokio::fs::write(&path, blob)
            .await
            .map_err(|e| io_err(&path, e))?;
        tracing::info!(name, path = %path.display(), "snapshot saved");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}
