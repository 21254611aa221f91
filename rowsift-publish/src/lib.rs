//! Persists filtered tables as downloadable CSV artifacts.
//!
//! Filenames are time-ordered with a short random suffix, so
//! concurrent publishes never collide and a directory listing reads
//! chronologically. The artifact directory is shared, unowned state;
//! `purge` is the maintenance sweep over it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use rowsift_table::Table;
use rowsift_types::{DownloadHandle, PreviewRecord};

pub const DEFAULT_PREVIEW_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no artifact for handle {0}")]
    NotFound(String),
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact serialization error: {0}")]
    Serialize(String),
}

pub struct ResultPublisher {
    dir: PathBuf,
}

impl ResultPublisher {
    /// Open a publisher over `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, PublishError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize the table under a fresh time-ordered filename and
    /// return its handle.
    pub fn publish(&self, table: &Table) -> Result<DownloadHandle, PublishError> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let suffix = &Uuid::new_v4().simple().to_string()[..8];
        let filename = format!("filtered_results_{stamp}_{suffix}.csv");

        let bytes = table
            .to_csv_bytes()
            .map_err(|e| PublishError::Serialize(e.to_string()))?;
        std::fs::write(self.dir.join(&filename), bytes)?;
        tracing::info!(%filename, rows = table.row_count(), "published filtered table");
        Ok(DownloadHandle(filename))
    }

    /// First `n` rows of a table as ordered field->value records.
    pub fn preview(table: &Table, n: usize) -> Vec<PreviewRecord> {
        table.preview(n)
    }

    /// Resolve a handle to the artifact path. Handles are bare
    /// filenames; anything carrying a path separator or dot-dot is
    /// treated as unknown rather than resolved.
    pub fn resolve(&self, handle: &DownloadHandle) -> Result<PathBuf, PublishError> {
        let name = handle.as_str();
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(PublishError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(PublishError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    /// Read an artifact's bytes.
    pub fn read(&self, handle: &DownloadHandle) -> Result<Vec<u8>, PublishError> {
        let path = self.resolve(handle)?;
        Ok(std::fs::read(path)?)
    }

    /// Remove artifacts older than the given age. Returns how many
    /// files were deleted; individual deletion failures are logged and
    /// skipped so one bad entry cannot wedge the sweep.
    pub fn purge(&self, older_than: Duration) -> Result<usize, PublishError> {
        let now = std::time::SystemTime::now();
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable artifact entry, skipping");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(?path, error = %e, "no mtime for artifact, skipping");
                    continue;
                }
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age >= older_than {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!(?path, error = %e, "failed to remove artifact"),
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "purged expired artifacts");
        }
        Ok(removed)
    }
}
