//! Daemon configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::{Error, Result};

/// `gangwayd` configuration, loaded from `/etc/gangway/server.yaml` with
/// `GANGWAY_`-prefixed environment overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shared bearer token required on every authenticated route.
    #[serde(default)]
    pub token: String,
    /// Listen address; a bare `:port` binds all interfaces.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory receiving the daemon's log file.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Root of the per-project state directories and the owners registry.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Directory scanned by systemd for unit files and drop-ins.
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,
}

fn default_listen() -> String {
    ":8765".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/gangway")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/gangway")
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            listen: default_listen(),
            log_dir: default_log_dir(),
            state_dir: default_state_dir(),
            unit_dir: default_unit_dir(),
        }
    }
}

impl ServerConfig {
    /// Check required fields after extraction. A missing token is a startup
    /// error.
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::InvalidConfig("'token' is required".to_string()));
        }
        self.listen_addr()?;
        Ok(())
    }

    /// Resolve `listen` to a socket address, treating a bare `:port` as
    /// all-interfaces.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let addr = if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        };
        addr.parse().map_err(|e| {
            Error::InvalidConfig(format!("invalid listen address {:?}: {e}", self.listen))
        })
    }

    /// Configuration rooted in a scratch directory, for tests.
    pub fn for_testing(state_dir: PathBuf, unit_dir: PathBuf) -> Self {
        Self {
            token: "test-token".to_string(),
            listen: default_listen(),
            log_dir: state_dir.join("log"),
            state_dir,
            unit_dir,
        }
    }
}
