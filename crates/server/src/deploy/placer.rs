//! File placement.

use gangway_core::manifest::parse_mode;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::stream::LogSink;

#[derive(Debug, Error)]
pub enum PlaceError {
    #[error(transparent)]
    Mode(gangway_core::Error),

    #[error("mkdir {path:?}: {source}")]
    CreateParents {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("open source {path:?}: {source}")]
    OpenSource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("write {dest:?}: {source}")]
    Write {
        dest: String,
        #[source]
        source: io::Error,
    },
}

/// Copy a file out of the staging tree to an absolute destination.
///
/// Missing parent directories are created with mode 0755; the destination is
/// opened create-and-truncate at the requested mode and the bytes streamed
/// in. Deployments are serialized, so the non-transactional write never
/// races a concurrent deploy.
pub async fn place_file(
    sink: &LogSink,
    src: &Path,
    dest: &str,
    mode_str: &str,
) -> Result<(), PlaceError> {
    let mode = parse_mode(mode_str).map_err(PlaceError::Mode)?;

    let dest_path = Path::new(dest);
    if let Some(parent) = dest_path.parent() {
        create_parents(parent).await.map_err(|source| PlaceError::CreateParents {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut reader = fs::File::open(src).await.map_err(|source| PlaceError::OpenSource {
        path: src.to_path_buf(),
        source,
    })?;
    let mut writer = open_with_mode(dest_path, mode)
        .await
        .map_err(|source| PlaceError::Write {
            dest: dest.to_string(),
            source,
        })?;
    tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|source| PlaceError::Write {
            dest: dest.to_string(),
            source,
        })?;

    let shown = if mode_str.is_empty() { "0644" } else { mode_str };
    sink.line(format!("Placed {dest} (mode {shown})"));
    Ok(())
}

async fn create_parents(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(0o755);
    builder.create(dir).await
}

async fn open_with_mode(path: &Path, mode: u32) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
        .await
}
