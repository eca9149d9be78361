//! Server-side hook scripts.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;

use crate::exec::CommandError;
use crate::stream::LogSink;

/// Execute a hook script from the staging tree via `/bin/sh -c`, forwarding
/// its output into the deploy log. The script is made executable first.
/// Returns an error on non-zero exit; the caller decides whether that is
/// fatal (pre-hook) or a warning (post-hook).
pub async fn run_hook(sink: &LogSink, script: &Path) -> Result<(), CommandError> {
    let display = script.display().to_string();

    fs::set_permissions(script, Permissions::from_mode(0o755))
        .await
        .map_err(|source| CommandError::Spawn {
            program: display.clone(),
            source,
        })?;

    sink.line(format!("Running hook: {display}"));
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(&display)
        .current_dir("/")
        .output()
        .await
        .map_err(|source| CommandError::Spawn {
            program: display.clone(),
            source,
        })?;

    sink.raw(&String::from_utf8_lossy(&output.stdout));
    sink.raw(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: display,
            status: output.status,
        });
    }
    Ok(())
}
