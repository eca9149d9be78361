//! Rollback snapshots.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

use crate::stream::LogSink;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no rollback snapshot available for project {0:?}")]
    Missing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("new-files list: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-project pre-deployment snapshots enabling one-step rollback.
///
/// A snapshot is a directory holding a `files/` subtree that mirrors the
/// absolute destination paths which existed before the deployment, plus a
/// `new-files.json` list of destinations the deployment introduced. At most
/// one snapshot exists per project: it is replaced at the start of each
/// deployment and consumed by a successful rollback.
#[derive(Clone)]
pub struct SnapshotStore {
    root: Arc<PathBuf>,
}

impl SnapshotStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            root: Arc::new(state_dir),
        }
    }

    fn base(&self, project: &str) -> PathBuf {
        self.root.join(project).join("rollback")
    }

    /// True when a snapshot exists for the project.
    pub async fn rollback_available(&self, project: &str) -> bool {
        fs::try_exists(self.base(project)).await.unwrap_or(false)
    }

    /// Record the pre-deployment content of every destination, replacing any
    /// previous snapshot. Destinations that do not exist yet go on the
    /// new-files list so rollback can delete them.
    pub async fn backup_files(&self, project: &str, dests: &[String]) -> Result<(), SnapshotError> {
        let base = self.base(project);
        let files_dir = base.join("files");

        if fs::try_exists(&base).await.unwrap_or(false) {
            fs::remove_dir_all(&base).await?;
        }
        fs::create_dir_all(&files_dir).await?;

        let mut new_files = Vec::new();
        for dest in dests {
            if !fs::try_exists(dest).await.unwrap_or(false) {
                new_files.push(dest.clone());
                continue;
            }
            let backup_path = files_dir.join(dest.trim_start_matches('/'));
            if let Some(parent) = backup_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            // fs::copy carries the permission bits along with the content.
            fs::copy(dest, &backup_path).await?;
        }

        let data = serde_json::to_vec(&new_files)?;
        fs::write(base.join("new-files.json"), data).await?;
        Ok(())
    }

    /// Undo the last deployment: restore every backed-up file, remove every
    /// newly introduced path, then delete the snapshot.
    pub async fn restore_backup(&self, project: &str, sink: &LogSink) -> Result<(), SnapshotError> {
        let base = self.base(project);
        let files_dir = base.join("files");

        if !fs::try_exists(&base).await.unwrap_or(false) {
            return Err(SnapshotError::Missing(project.to_string()));
        }

        for path in collect_regular_files(files_dir.clone()).await? {
            let Ok(rel) = path.strip_prefix(&files_dir) else {
                continue;
            };
            let dest = Path::new("/").join(rel);
            sink.line(format!("rollback: restoring {}", dest.display()));
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(&path, &dest).await?;
        }

        let new_files: Vec<String> = match fs::read(base.join("new-files.json")).await {
            Ok(data) => serde_json::from_slice(&data).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        for file in new_files {
            sink.line(format!("rollback: removing new file {file}"));
            let _ = fs::remove_file(&file).await;
        }

        fs::remove_dir_all(&base).await?;
        Ok(())
    }
}

/// Walk the snapshot tree on a blocking thread.
async fn collect_regular_files(dir: PathBuf) -> std::io::Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&dir) {
            let entry = entry.map_err(std::io::Error::other)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    })
    .await
    .map_err(std::io::Error::other)?
}
