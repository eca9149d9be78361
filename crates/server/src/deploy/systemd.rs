//! Systemd unit installation.

use std::path::Path;
use thiserror::Error;

use super::placer::{place_file, PlaceError};
use crate::exec::{run_logged, CommandError};
use crate::stream::LogSink;

#[derive(Debug, Error)]
pub enum SystemdError {
    #[error(transparent)]
    Place(#[from] PlaceError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Place a unit file at its destination and tell systemd about it: a
/// daemon-reload always, then enable and restart as requested. Any non-zero
/// systemctl exit fails the phase.
pub async fn install_unit(
    sink: &LogSink,
    src: &Path,
    unit_dest: &str,
    enable: bool,
    restart: bool,
) -> Result<(), SystemdError> {
    place_file(sink, src, unit_dest, "0644").await?;

    run_logged(sink, "systemctl", &["daemon-reload"]).await?;

    let unit_name = Path::new(unit_dest)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(unit_dest);

    if enable {
        run_logged(sink, "systemctl", &["enable", unit_name]).await?;
    }
    if restart {
        run_logged(sink, "systemctl", &["restart", unit_name]).await?;
    }
    Ok(())
}
