//! Common test utilities.

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use gangway_core::archive::ArchiveWriter;
use gangway_core::config::ServerConfig;
use gangway_server::{create_router, AppState};
use std::path::PathBuf;
use tempfile::TempDir;
use tower::ServiceExt;

/// Token accepted by every [`TestServer`].
#[allow(dead_code)]
pub const TEST_TOKEN: &str = "test-token";

const BOUNDARY: &str = "gangway-test-boundary";

/// A daemon instance rooted in a scratch directory. Destinations written by
/// deployments live under the scratch dir too, so their absolute paths are
/// writable without privileges.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    scratch: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    pub fn new() -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        let config = ServerConfig::for_testing(
            scratch.path().join("state"),
            scratch.path().join("units"),
        );
        let state = AppState::new(config);
        let router = create_router(state.clone());
        Self {
            router,
            state,
            scratch,
        }
    }

    /// An absolute destination path inside the scratch dir.
    pub fn host_path(&self, rel: &str) -> String {
        self.scratch
            .path()
            .join("host")
            .join(rel)
            .to_str()
            .expect("utf-8 path")
            .to_string()
    }

    /// Pre-create a file at a host path, as if a prior deployment left it.
    pub fn write_host_file(&self, rel: &str, content: &str) -> String {
        let path = self.host_path(rel);
        let parent = PathBuf::from(&path);
        std::fs::create_dir_all(parent.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, content).expect("write");
        path
    }

    pub fn state_dir(&self) -> PathBuf {
        self.scratch.path().join("state")
    }
}

/// Send a request and collect the full (possibly streamed) response body.
#[allow(dead_code)]
pub async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    (status, String::from_utf8_lossy(&body).into_owned())
}

/// Build a JSON POST, optionally authenticated.
#[allow(dead_code)]
pub fn json_request(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).expect("json")))
        .expect("request")
}

/// Build the two-part deploy body: `manifest` (JSON), then `archive`.
#[allow(dead_code)]
pub fn deploy_request(token: Option<&str>, manifest: &serde_json::Value, archive: &[u8]) -> Request<Body> {
    multipart_request(
        token,
        &[
            ("manifest", "application/json", serde_json::to_vec(manifest).expect("json")),
            ("archive", "application/octet-stream", archive.to_vec()),
        ],
    )
}

/// Hand-rolled multipart body so tests control part names and order.
#[allow(dead_code)]
pub fn multipart_request(
    token: Option<&str>,
    parts: &[(&str, &str, Vec<u8>)],
) -> Request<Body> {
    let mut body = Vec::new();
    for (name, content_type, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri("/deploy")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).expect("request")
}

/// Build a gzip tape archive from (archive_path, content, mode) triples.
#[allow(dead_code)]
pub fn build_archive(entries: &[(&str, &str, u32)]) -> Vec<u8> {
    let scratch = tempfile::tempdir().expect("archive scratch");
    let mut writer = ArchiveWriter::new(Vec::new());
    for (index, (archive_path, content, mode)) in entries.iter().enumerate() {
        let src = scratch.path().join(format!("entry-{index}"));
        std::fs::write(&src, content).expect("write entry");
        writer.add_file(&src, archive_path, *mode).expect("add entry");
    }
    writer.finish().expect("finish archive")
}

/// The last non-empty line of a streamed body.
#[allow(dead_code)]
pub fn last_line(body: &str) -> &str {
    body.lines().filter(|line| !line.is_empty()).next_back().unwrap_or("")
}
