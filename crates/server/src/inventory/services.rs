//! Service reconciliation with environment drop-ins.

use gangway_core::manifest::{Service, ServiceState};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;

use super::InventoryError;
use crate::exec::{probe, run_logged};
use crate::stream::LogSink;

/// Basename of the drop-in this daemon owns inside
/// `<unit_dir>/<service>.service.d/`.
const DROPIN_NAME: &str = "gangway-env.conf";

/// Outcome of an env drop-in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvSync {
    Unchanged,
    Written,
    Removed,
}

impl EnvSync {
    pub fn changed(self) -> bool {
        !matches!(self, EnvSync::Unchanged)
    }
}

/// Render the drop-in: a `[Service]` section with one `Environment` line per
/// key in sorted order, embedded quotes escaped. Deterministic, so the
/// idempotence check can be byte-exact.
pub fn render_env_dropin(env: &BTreeMap<String, String>) -> String {
    use std::fmt::Write;
    let mut out = String::from("[Service]\n");
    for (key, value) in env {
        let escaped = value.replace('"', "\\\"");
        let _ = writeln!(out, "Environment=\"{key}={escaped}\"");
    }
    out
}

fn dropin_path(unit_dir: &Path, service: &str) -> PathBuf {
    unit_dir.join(format!("{service}.service.d")).join(DROPIN_NAME)
}

/// Write or remove the drop-in file so it matches `env`. Byte-identical
/// content is left untouched. The caller runs the daemon-reload when the
/// result reports a change.
pub async fn sync_env_dropin(
    unit_dir: &Path,
    service: &str,
    env: &BTreeMap<String, String>,
) -> io::Result<EnvSync> {
    let path = dropin_path(unit_dir, service);

    if env.is_empty() {
        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path).await?;
            return Ok(EnvSync::Removed);
        }
        return Ok(EnvSync::Unchanged);
    }

    let content = render_env_dropin(env);
    if let Ok(existing) = fs::read(&path).await {
        if existing == content.as_bytes() {
            return Ok(EnvSync::Unchanged);
        }
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&path, content).await?;
    Ok(EnvSync::Written)
}

/// Current enabled-state of a unit as reported by systemd.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnabledState {
    Enabled,
    Disabled,
    /// systemd does not know the unit (or systemctl is unavailable).
    Unknown,
}

async fn enabled_state(service: &str) -> EnabledState {
    let output = match Command::new("systemctl")
        .args(["is-enabled", service])
        .output()
        .await
    {
        Ok(output) => output,
        Err(_) => return EnabledState::Unknown,
    };
    if output.status.success() {
        return EnabledState::Enabled;
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("No such file or directory") || stderr.contains("not-found") {
        EnabledState::Unknown
    } else {
        EnabledState::Disabled
    }
}

async fn is_active(service: &str) -> bool {
    probe("systemctl", &["is-active", "--quiet", service]).await
}

/// Bring one service to its desired state.
///
/// Order within a service is fixed: env drop-in, then enable/disable, then
/// run state, because a start must see the final unit definition.
pub async fn reconcile_service(
    sink: &LogSink,
    unit_dir: &Path,
    svc: &Service,
) -> Result<(), InventoryError> {
    let command_failed = |source| InventoryError::Service {
        service: svc.name.clone(),
        source,
    };

    let sync = sync_env_dropin(unit_dir, &svc.name, &svc.env)
        .await
        .map_err(|source| InventoryError::Dropin {
            service: svc.name.clone(),
            source,
        })?;
    match sync {
        EnvSync::Written => sink.line(format!("Writing env drop-in for service: {}", svc.name)),
        EnvSync::Removed => sink.line(format!("Removing env drop-in for service: {}", svc.name)),
        EnvSync::Unchanged => {}
    }
    if sync.changed() {
        run_logged(sink, "systemctl", &["daemon-reload"])
            .await
            .map_err(command_failed)?;
    }
    let env_changed = sync.changed();

    let current = enabled_state(&svc.name).await;
    if current == EnabledState::Unknown {
        // Usually a unit from a package installed moments ago that systemd
        // has not indexed yet; never fatal.
        sink.warn(format!("cannot check service {}, skipping", svc.name));
        return Ok(());
    }

    if svc.enabled && current == EnabledState::Disabled {
        sink.line(format!("Enabling service: {}", svc.name));
        run_logged(sink, "systemctl", &["enable", &svc.name])
            .await
            .map_err(command_failed)?;
    } else if !svc.enabled && current == EnabledState::Enabled {
        sink.line(format!("Disabling service: {}", svc.name));
        run_logged(sink, "systemctl", &["disable", &svc.name])
            .await
            .map_err(command_failed)?;
    }

    match svc.state {
        ServiceState::Started => {
            if !is_active(&svc.name).await {
                sink.line(format!("Starting service: {}", svc.name));
                run_logged(sink, "systemctl", &["start", &svc.name])
                    .await
                    .map_err(command_failed)?;
            } else if env_changed {
                sink.line(format!("Restarting service (env changed): {}", svc.name));
                run_logged(sink, "systemctl", &["restart", &svc.name])
                    .await
                    .map_err(command_failed)?;
            }
        }
        ServiceState::Stopped => {
            if is_active(&svc.name).await {
                sink.line(format!("Stopping service: {}", svc.name));
                run_logged(sink, "systemctl", &["stop", &svc.name])
                    .await
                    .map_err(command_failed)?;
            }
        }
    }

    Ok(())
}
