use crate::utils::validation::sanitize_filename;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging directory '{path}' is not usable: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write staged file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StagingError {
    /// The underlying I/O error
    pub fn io_error(&self) -> &io::Error {
        match self {
            StagingError::Directory { source, .. } | StagingError::Write { source, .. } => source,
        }
    }
}

/// An uploaded document written to the staging directory
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub created_at: DateTime<Utc>,
    pub size: u64,
}

/// One entry of a staging directory snapshot
#[derive(Debug, Clone)]
pub struct StagingEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Owns the staging directory where uploads wait for conversion.
///
/// Staged names embed a random token next to the timestamp, so two uploads
/// with the same filename in the same second never share a path. Removal is
/// idempotent, which lets request handlers and the cleanup sweep race on the
/// same entry without coordination.
pub struct TempFileStore {
    root: PathBuf,
}

impl TempFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging directory if it does not exist yet
    pub async fn ensure_dir(&self) -> Result<(), StagingError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StagingError::Directory {
                path: self.root.clone(),
                source,
            })
    }

    fn staged_path(&self, original_name: &str, created_at: DateTime<Utc>) -> PathBuf {
        let name = format!(
            "{}_{}_{}",
            created_at.format("%Y%m%d_%H%M%S"),
            Uuid::new_v4().simple(),
            sanitize_filename(original_name)
        );
        self.root.join(name)
    }

    /// Stage an in-memory payload
    pub async fn stage(&self, original_name: &str, content: &[u8]) -> Result<StagedFile, StagingError> {
        self.stage_stream(original_name, content).await
    }

    /// Stream `reader` into a fresh staging file.
    ///
    /// On a write failure the partial file is removed before returning.
    pub async fn stage_stream<R>(&self, original_name: &str, mut reader: R) -> Result<StagedFile, StagingError>
    where
        R: AsyncRead + Unpin,
    {
        let created_at = Utc::now();
        let path = self.staged_path(original_name, created_at);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| StagingError::Write {
                path: path.clone(),
                source,
            })?;

        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => file.flush().await.map(|_| n),
            Err(e) => Err(e),
        };
        drop(file);

        match written {
            Ok(size) => {
                tracing::info!(
                    path = %path.display(),
                    filename = %original_name,
                    size,
                    "Staged upload"
                );
                Ok(StagedFile {
                    path,
                    original_name: original_name.to_string(),
                    created_at,
                    size,
                })
            }
            Err(source) => {
                tracing::warn!("Staging {} failed, discarding partial file: {}", path.display(), source);
                self.remove(&path).await;
                Err(StagingError::Write { path, source })
            }
        }
    }

    /// Scratch directory for converter output belonging to `staged`.
    ///
    /// It lives inside the staging directory so an orphaned one is swept too.
    pub fn scratch_dir(&self, staged: &StagedFile) -> PathBuf {
        let mut name = staged
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".out");
        self.root.join(name)
    }

    /// Delete a file or directory tree. Returns whether anything was removed.
    pub async fn try_remove(&self, path: &Path) -> io::Result<bool> {
        let metadata = match fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_file(path).await
        };

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort removal; failures are logged and never propagated
    pub async fn remove(&self, path: &Path) {
        match self.try_remove(path).await {
            Ok(true) => tracing::debug!("Removed staged entry {}", path.display()),
            Ok(false) => {}
            Err(e) => tracing::warn!("Error cleaning up {}: {}", path.display(), e),
        }
    }

    /// Snapshot of the staging directory contents
    pub async fn list_entries(&self) -> Result<Vec<StagingEntry>, StagingError> {
        let mut dir = fs::read_dir(&self.root)
            .await
            .map_err(|source| StagingError::Directory {
                path: self.root.clone(),
                source,
            })?;

        let mut entries = Vec::new();
        loop {
            let entry = match dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(StagingError::Directory {
                        path: self.root.clone(),
                        source,
                    });
                }
            };

            let path = entry.path();
            match fs::symlink_metadata(&path).await.and_then(|m| m.modified()) {
                Ok(modified) => entries.push(StagingEntry { path, modified }),
                // Raced with a concurrent removal
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Skipping {}: cannot read metadata: {}", path.display(), e),
            }
        }

        Ok(entries)
    }
}
