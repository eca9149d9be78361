//! User reconciliation.

use gangway_core::manifest::User;
use std::process::Stdio;
use tokio::process::Command;

use super::InventoryError;
use crate::exec::run_logged;
use crate::stream::LogSink;

async fn user_exists(name: &str) -> bool {
    Command::new("id")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Create a system user when absent. Users are never deleted and existing
/// users are never mutated; shell and group changes are out of scope.
pub async fn ensure_user(sink: &LogSink, user: &User) -> Result<(), InventoryError> {
    if user_exists(&user.name).await {
        sink.line(format!("User {} already exists, skipping", user.name));
        return Ok(());
    }

    sink.line(format!("Creating user: {}", user.name));

    let mut args: Vec<String> = vec!["--system".to_string()];
    if let Some(home) = &user.home {
        args.extend([
            "--home-dir".to_string(),
            home.clone(),
            "--create-home".to_string(),
        ]);
    } else {
        args.push("--no-create-home".to_string());
    }
    let shell = user
        .shell
        .clone()
        .unwrap_or_else(|| "/usr/sbin/nologin".to_string());
    args.extend(["--shell".to_string(), shell]);
    if !user.groups.is_empty() {
        args.extend(["--groups".to_string(), user.groups.join(",")]);
    }
    args.push(user.name.clone());

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_logged(sink, "useradd", &arg_refs)
        .await
        .map_err(|source| InventoryError::User {
            user: user.name.clone(),
            source,
        })
}
