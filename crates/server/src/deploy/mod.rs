//! The deployment orchestrator.
//!
//! One deployment runs its phases strictly in order:
//! archive extraction into staging, inventory reconciliation, rollback
//! snapshot, pre-hook, file placement, systemd unit, post-hook. The caller
//! holds the single-deployment lock for the whole run and appends the
//! sentinel on success.

pub mod backup;
pub mod hooks;
pub mod placer;
pub mod systemd;

pub use backup::{SnapshotError, SnapshotStore};

use gangway_core::archive;
use gangway_core::manifest::{Hooks, Manifest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

use crate::exec::CommandError;
use crate::inventory::{InventoryError, Reconciler};
use crate::state::AppState;
use crate::stream::LogSink;

/// A fatal deployment failure, written to the stream as an `ERROR:` line.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("extracting archive: {0}")]
    Staging(gangway_core::Error),

    #[error("inventory reconciliation: {0}")]
    Inventory(#[from] InventoryError),

    #[error("placing {dest}: {source}")]
    Placement {
        dest: String,
        #[source]
        source: placer::PlaceError,
    },

    #[error("systemd: {0}")]
    Systemd(#[from] systemd::SystemdError),

    #[error("pre-hook: {0}")]
    PreHook(CommandError),
}

/// Run every phase of one deployment, streaming progress into `sink`.
///
/// The caller already holds the deployment lock and has spooled the
/// multipart archive part to `archive_path` inside `staging`; the staging
/// directory is deleted when it is dropped, on every exit path.
pub async fn run_deployment(
    state: &AppState,
    manifest: &Manifest,
    staging: &TempDir,
    archive_path: &Path,
    sink: &LogSink,
) -> Result<(), DeployError> {
    let tree = staging.path().join("tree");
    extract_archive(archive_path, tree.clone()).await?;

    sink.line(format!("Starting deployment of {}", manifest.name));

    if let Some(inventory) = &manifest.inventory {
        sink.line("Reconciling inventory...");
        let reconciler = Reconciler::new(state.inventory.clone(), state.config.unit_dir.clone());
        reconciler.reconcile(&manifest.name, inventory, sink).await?;
    }

    // Snapshot every declared destination, whether or not it will change.
    let dests: Vec<String> = manifest.files.iter().map(|f| f.dest.clone()).collect();
    if let Err(e) = state.snapshots.backup_files(&manifest.name, &dests).await {
        sink.warn(format!("backup failed (rollback unavailable): {e}"));
    }

    if let Some(script) = hook_script(manifest, &tree, |h| h.server_pre.as_deref()) {
        hooks::run_hook(sink, &script)
            .await
            .map_err(DeployError::PreHook)?;
    }

    for file in &manifest.files {
        if file.archive_path.is_empty() {
            sink.line(format!("Skipping {} (unchanged)", file.dest));
            continue;
        }
        let src = tree.join(&file.archive_path);
        placer::place_file(sink, &src, &file.dest, &file.mode)
            .await
            .map_err(|source| DeployError::Placement {
                dest: file.dest.clone(),
                source,
            })?;
    }

    if let Some(unit) = &manifest.systemd {
        let src = tree.join(&unit.unit_archive_path);
        systemd::install_unit(sink, &src, &unit.unit_dest, unit.enable, unit.restart).await?;
    }

    if let Some(script) = hook_script(manifest, &tree, |h| h.server_post.as_deref()) {
        if let Err(e) = hooks::run_hook(sink, &script).await {
            // Post-hooks restart and reload things; their failure must not
            // fail an otherwise complete deployment.
            sink.warn(format!("post-hook failed: {e}"));
        }
    }

    sink.line("Deployment complete");
    Ok(())
}

async fn extract_archive(archive_path: &Path, tree: PathBuf) -> Result<(), DeployError> {
    let archive_path = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_path).map_err(gangway_core::Error::Io)?;
        archive::extract(std::io::BufReader::new(file), &tree)
    })
    .await
    .map_err(|e| DeployError::Staging(gangway_core::Error::Archive(format!("extraction task: {e}"))))?
    .map_err(DeployError::Staging)
}

fn hook_script<'a>(
    manifest: &'a Manifest,
    tree: &Path,
    pick: impl Fn(&'a Hooks) -> Option<&'a str>,
) -> Option<PathBuf> {
    manifest
        .hooks
        .as_ref()
        .and_then(pick)
        .filter(|path| !path.is_empty())
        .map(|path| tree.join(path))
}
