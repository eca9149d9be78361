//! Request handlers for the four routes.

use axum::body::{Body, Bytes};
use axum::extract::{Multipart, State};
use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gangway_core::hash;
use gangway_core::manifest::{CheckRequest, CheckResponse, Manifest};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::deploy;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::stream::LogSink;

/// `GET /health`: unauthenticated liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /check`: delta negotiation.
///
/// For each declared destination the server fingerprints the existing file,
/// if any, and reports the destination as stale when the file is missing or
/// the fingerprints differ. Responses preserve request order.
pub async fn check(body: Bytes) -> ApiResult<Json<CheckResponse>> {
    let request: CheckRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::Protocol(e.to_string()))?;

    let dests: Vec<String> = request.files.iter().map(|f| f.dest.clone()).collect();
    let server_hashes = tokio::task::spawn_blocking(move || hash::hash_existing(&dests))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let upload: Vec<String> = request
        .files
        .iter()
        .filter(|f| server_hashes.get(&f.dest) != Some(&f.hash))
        .map(|f| f.dest.clone())
        .collect();

    tracing::debug!(
        project = %request.name,
        declared = request.files.len(),
        stale = upload.len(),
        "delta check"
    );
    Ok(Json(CheckResponse { upload }))
}

/// `POST /deploy`: multipart manifest plus archive, streamed log response.
///
/// The multipart body is consumed before the response commits, so malformed
/// requests still get a clean 400; everything after extraction surfaces only
/// on the stream.
pub async fn deploy(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    // Serialize deployments: one at a time, never waiting.
    let guard = state
        .deploy_lock
        .clone()
        .try_lock_owned()
        .map_err(|_| ApiError::Conflict)?;

    let staging = tempfile::tempdir()
        .map_err(|e| ApiError::Internal(format!("creating staging dir: {e}")))?;

    // Exactly two parts, in order: `manifest`, then `archive`.
    let manifest_field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Protocol(format!("reading multipart: {e}")))?
        .ok_or_else(|| ApiError::Protocol("expected 'manifest' part".to_string()))?;
    if manifest_field.name() != Some("manifest") {
        return Err(ApiError::Protocol("expected 'manifest' part".to_string()));
    }
    let manifest_bytes = manifest_field
        .bytes()
        .await
        .map_err(|e| ApiError::Protocol(format!("reading manifest: {e}")))?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| ApiError::Protocol(format!("parsing manifest: {e}")))?;
    manifest
        .validate()
        .map_err(|e| ApiError::Protocol(e.to_string()))?;

    let mut archive_field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Protocol(format!("reading multipart: {e}")))?
        .ok_or_else(|| ApiError::Protocol("expected 'archive' part".to_string()))?;
    if archive_field.name() != Some("archive") {
        return Err(ApiError::Protocol("expected 'archive' part".to_string()));
    }

    let archive_path = staging.path().join("deploy.tar.gz");
    let mut archive_file = tokio::fs::File::create(&archive_path)
        .await
        .map_err(|e| ApiError::Internal(format!("spooling archive: {e}")))?;
    while let Some(chunk) = archive_field
        .chunk()
        .await
        .map_err(|e| ApiError::Protocol(format!("reading archive: {e}")))?
    {
        archive_file
            .write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("spooling archive: {e}")))?;
    }
    archive_file
        .flush()
        .await
        .map_err(|e| ApiError::Internal(format!("spooling archive: {e}")))?;
    drop(archive_file);

    tracing::info!(project = %manifest.name, files = manifest.files.len(), "deployment started");

    let (sink, body) = LogSink::channel();
    let task_state = state.clone();
    tokio::spawn(async move {
        // The lock is held and the staging directory lives until the
        // deployment finishes, even if the client has disconnected.
        let _guard = guard;
        let staging = staging;
        match deploy::run_deployment(&task_state, &manifest, &staging, &archive_path, &sink).await {
            Ok(()) => {
                tracing::info!(project = %manifest.name, "deployment complete");
                sink.status_ok();
            }
            Err(e) => {
                tracing::error!(project = %manifest.name, error = %e, "deployment failed");
                sink.error(e.to_string());
            }
        }
    });

    Ok(streamed(body))
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub name: String,
}

/// `POST /rollback`: restore the project snapshot, streamed log response.
pub async fn rollback(State(state): State<AppState>, body: Bytes) -> ApiResult<Response> {
    let request: RollbackRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::Protocol("missing project name".to_string()))?;
    if request.name.is_empty() {
        return Err(ApiError::Protocol("missing project name".to_string()));
    }

    let guard = state
        .deploy_lock
        .clone()
        .try_lock_owned()
        .map_err(|_| ApiError::Conflict)?;

    let (sink, body) = LogSink::channel();
    let snapshots = state.snapshots.clone();
    tokio::spawn(async move {
        let _guard = guard;
        if !snapshots.rollback_available(&request.name).await {
            sink.error(format!(
                "no rollback snapshot available for {:?}",
                request.name
            ));
            return;
        }
        sink.line(format!("Rolling back {}...", request.name));
        match snapshots.restore_backup(&request.name, &sink).await {
            Ok(()) => {
                tracing::info!(project = %request.name, "rollback complete");
                sink.line("Rollback complete");
                sink.status_ok();
            }
            Err(e) => {
                tracing::error!(project = %request.name, error = %e, "rollback failed");
                sink.error(format!("rollback failed: {e}"));
            }
        }
    });

    Ok(streamed(body))
}

/// Commit 200 and start streaming. From here on, failures surface only as
/// `ERROR:` lines and a missing sentinel.
fn streamed(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response()
}
