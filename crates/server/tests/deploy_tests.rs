//! End-to-end deployment scenarios: delta placement, hooks, snapshots, and
//! rollback, exercised through the router with a streamed response.

mod common;

use axum::http::StatusCode;
use common::{build_archive, deploy_request, json_request, last_line, send, TestServer, TEST_TOKEN};
use gangway_core::hash::Fingerprint;
use gangway_core::STATUS_OK;
use serde_json::json;
use std::os::unix::fs::PermissionsExt;

fn file_entry(archive_path: &str, dest: &str, mode: &str, content: &str) -> serde_json::Value {
    json!({
        "archive_path": archive_path,
        "dest": dest,
        "mode": mode,
        "hash": Fingerprint::of_bytes(content.as_bytes()).as_str(),
    })
}

#[tokio::test]
async fn fresh_deploy_places_files_with_modes_and_ends_with_sentinel() {
    let server = TestServer::new();
    let bin = server.host_path("opt/app/bin");
    let cfg = server.host_path("opt/app/cfg");

    let manifest = json!({"name": "web", "files": [
        file_entry("files/0/bin", &bin, "0755", "#!/bin/sh\necho app\n"),
        file_entry("files/0/cfg", &cfg, "0644", "port = 8080\n"),
    ]});
    let archive = build_archive(&[
        ("files/0/bin", "#!/bin/sh\necho app\n", 0o644),
        ("files/0/cfg", "port = 8080\n", 0o644),
    ]);

    let (status, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("[gangway] Starting deployment of web"));
    assert!(body.contains(&format!("[gangway] Placed {bin} (mode 0755)")));
    assert_eq!(last_line(&body), STATUS_OK);

    assert_eq!(
        std::fs::read_to_string(&bin).unwrap(),
        "#!/bin/sh\necho app\n"
    );
    assert_eq!(std::fs::read_to_string(&cfg).unwrap(), "port = 8080\n");
    let mode = std::fs::metadata(&bin).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    // The pre-deploy snapshot exists even for a fresh project.
    assert!(server.state_dir().join("web/rollback").exists());
}

#[tokio::test]
async fn partial_delta_skips_unchanged_files() {
    let server = TestServer::new();
    let bin = server.write_host_file("opt/app/bin", "binary v1");
    let cfg = server.write_host_file("opt/app/cfg", "config v1");

    // Only the config changed; the binary ships with an empty archive path.
    let manifest = json!({"name": "web", "files": [
        file_entry("", &bin, "0755", "binary v1"),
        file_entry("files/0/cfg", &cfg, "0644", "config v2"),
    ]});
    let archive = build_archive(&[("files/0/cfg", "config v2", 0o644)]);

    let (status, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&format!("[gangway] Skipping {bin} (unchanged)")));
    assert_eq!(last_line(&body), STATUS_OK);
    assert_eq!(std::fs::read_to_string(&bin).unwrap(), "binary v1");
    assert_eq!(std::fs::read_to_string(&cfg).unwrap(), "config v2");
}

#[tokio::test]
async fn rollback_restores_previous_content_and_removes_new_files() {
    let server = TestServer::new();
    let cfg = server.write_host_file("opt/app/cfg", "config v1");
    let extra = server.host_path("opt/app/extra");

    // The second deployment corrupts the config and introduces a new file.
    let manifest = json!({"name": "web", "files": [
        file_entry("files/0/cfg", &cfg, "0644", "config v2, corrupt"),
        file_entry("files/0/extra", &extra, "0644", "introduced in v2"),
    ]});
    let archive = build_archive(&[
        ("files/0/cfg", "config v2, corrupt", 0o644),
        ("files/0/extra", "introduced in v2", 0o644),
    ]);
    let (_, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;
    assert_eq!(last_line(&body), STATUS_OK);
    assert_eq!(
        std::fs::read_to_string(&cfg).unwrap(),
        "config v2, corrupt"
    );
    assert!(std::path::Path::new(&extra).exists());

    let (status, body) = send(
        &server.router,
        json_request("/rollback", Some(TEST_TOKEN), json!({"name": "web"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(&format!("[gangway] rollback: restoring {cfg}")));
    assert!(body.contains(&format!("[gangway] rollback: removing new file {extra}")));
    assert_eq!(last_line(&body), STATUS_OK);

    assert_eq!(std::fs::read_to_string(&cfg).unwrap(), "config v1");
    assert!(!std::path::Path::new(&extra).exists());

    // The snapshot was consumed: a second rollback has nothing to restore.
    let (_, body) = send(
        &server.router,
        json_request("/rollback", Some(TEST_TOKEN), json!({"name": "web"})),
    )
    .await;
    assert!(body.contains("ERROR: no rollback snapshot available"));
}

#[tokio::test]
async fn failing_pre_hook_aborts_before_files_are_placed() {
    let server = TestServer::new();
    let cfg = server.host_path("opt/app/cfg");

    let manifest = json!({
        "name": "web",
        "files": [file_entry("files/0/cfg", &cfg, "0644", "never placed")],
        "hooks": {"server_pre": "scripts/pre-deploy.sh"},
    });
    let archive = build_archive(&[
        ("files/0/cfg", "never placed", 0o644),
        ("scripts/pre-deploy.sh", "#!/bin/sh\necho preparing\nexit 1\n", 0o755),
    ]);

    let (status, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("preparing"));
    assert!(body.contains("[gangway] ERROR: pre-hook:"));
    assert!(!body.contains(STATUS_OK));
    assert!(!std::path::Path::new(&cfg).exists());
}

#[tokio::test]
async fn failing_post_hook_is_a_warning_not_a_failure() {
    let server = TestServer::new();
    let cfg = server.host_path("opt/app/cfg");

    let manifest = json!({
        "name": "web",
        "files": [file_entry("files/0/cfg", &cfg, "0644", "placed anyway")],
        "hooks": {"server_post": "scripts/post-deploy.sh"},
    });
    let archive = build_archive(&[
        ("files/0/cfg", "placed anyway", 0o644),
        ("scripts/post-deploy.sh", "#!/bin/sh\nexit 7\n", 0o755),
    ]);

    let (_, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert!(body.contains("[gangway] WARNING: post-hook failed"));
    assert_eq!(last_line(&body), STATUS_OK);
    assert_eq!(std::fs::read_to_string(&cfg).unwrap(), "placed anyway");
}

#[tokio::test]
async fn hooks_run_from_the_staging_tree() {
    let server = TestServer::new();
    let marker = server.host_path("marker");
    std::fs::create_dir_all(std::path::Path::new(&marker).parent().unwrap()).unwrap();

    let manifest = json!({
        "name": "web",
        "files": [],
        "hooks": {"server_pre": "scripts/pre-deploy.sh"},
    });
    let script = format!("#!/bin/sh\necho ran > {marker}\n");
    let archive = build_archive(&[("scripts/pre-deploy.sh", &script, 0o755)]);

    let (_, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert!(body.contains("[gangway] Running hook: "));
    assert_eq!(last_line(&body), STATUS_OK);
    assert_eq!(std::fs::read_to_string(&marker).unwrap(), "ran\n");
}

#[tokio::test]
async fn empty_inventory_is_reconciled_and_persisted() {
    let server = TestServer::new();

    let manifest = json!({
        "name": "web",
        "files": [],
        "inventory": {"packages": [], "services": [], "users": []},
    });
    let archive = build_archive(&[]);

    let (_, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert!(body.contains("[gangway] Reconciling inventory..."));
    assert_eq!(last_line(&body), STATUS_OK);
    assert!(server.state_dir().join("web/inventory.json").exists());
    assert!(server
        .state_dir()
        .join(".global/package-owners.json")
        .exists());
}

#[tokio::test]
async fn missing_archive_entry_fails_placement_and_keeps_snapshot() {
    let server = TestServer::new();
    let cfg = server.write_host_file("opt/app/cfg", "config v1");

    // The manifest references an entry the archive does not carry.
    let manifest = json!({"name": "web", "files": [
        file_entry("files/0/cfg", &cfg, "0644", "config v2"),
    ]});
    let archive = build_archive(&[]);

    let (_, body) = send(
        &server.router,
        deploy_request(Some(TEST_TOKEN), &manifest, &archive),
    )
    .await;

    assert!(body.contains(&format!("[gangway] ERROR: placing {cfg}")));
    assert!(!body.contains(STATUS_OK));
    // The snapshot from this failed deployment still allows rollback.
    assert!(server.state_dir().join("web/rollback").exists());

    let (_, body) = send(
        &server.router,
        json_request("/rollback", Some(TEST_TOKEN), json!({"name": "web"})),
    )
    .await;
    assert_eq!(last_line(&body), STATUS_OK);
    assert_eq!(std::fs::read_to_string(&cfg).unwrap(), "config v1");
}
