//! Wire types shared by the client and the daemon.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::hash::Fingerprint;
use crate::{Error, Result};

/// Directories accepted as systemd unit destinations.
const UNIT_SEARCH_DIRS: &[&str] = &[
    "/etc/systemd/system",
    "/usr/lib/systemd/system",
    "/lib/systemd/system",
];

/// Body of `POST /check`: the client's view of every file it would deploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub name: String,
    pub files: Vec<FileHashEntry>,
}

/// Destination path and fingerprint of one local file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHashEntry {
    pub dest: String,
    pub hash: Fingerprint,
}

/// Response to `POST /check`: the destinations the server wants uploaded.
/// The server never reveals its own fingerprints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckResponse {
    pub upload: Vec<String>,
}

/// The deployment descriptor submitted as the `manifest` multipart part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systemd: Option<SystemdUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Inventory>,
}

/// One file to place on the host.
///
/// An empty `archive_path` marks a file the server already has (delta skip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(default)]
    pub archive_path: String,
    pub dest: String,
    #[serde(default)]
    pub mode: String,
    pub hash: Fingerprint,
}

/// Archive paths of the server-side hook scripts, relative to the staging
/// tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_pre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_post: Option<String>,
}

/// An optional systemd unit shipped with the deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemdUnit {
    pub unit_archive_path: String,
    pub unit_dest: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub restart: bool,
}

/// Desired system state declared by a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub users: Vec<User>,
}

impl Inventory {
    /// True when the inventory declares nothing at all.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.services.is_empty() && self.users.is_empty()
    }
}

/// Desired state of one systemd service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    pub state: ServiceState,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Whether a service should be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Started,
    Stopped,
}

/// A system user to ensure exists. Users are never deleted or mutated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Parse an octal mode string such as `"0755"`. Empty defaults to 0644.
pub fn parse_mode(mode: &str) -> Result<u32> {
    if mode.is_empty() {
        return Ok(0o644);
    }
    u32::from_str_radix(mode, 8)
        .map_err(|e| Error::InvalidManifest(format!("invalid mode {mode:?}: {e}")))
}

/// Archive paths are looked up inside the staging tree, so they must stay
/// strictly relative: no root, no `.` or `..` components.
fn check_archive_path(path: &str) -> Result<()> {
    let safe = Path::new(path)
        .components()
        .all(|c| matches!(c, std::path::Component::Normal(_)));
    if path.is_empty() || !safe {
        return Err(Error::InvalidManifest(format!(
            "archive path {path:?} must be a plain relative path"
        )));
    }
    Ok(())
}

impl Manifest {
    /// Validate the invariants the daemon relies on before any phase runs.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidManifest(
                "project name must not be empty".to_string(),
            ));
        }
        for file in &self.files {
            if !file.dest.starts_with('/') {
                return Err(Error::InvalidManifest(format!(
                    "destination {:?} is not absolute",
                    file.dest
                )));
            }
            // Empty marks a delta skip; anything else must stay in staging.
            if !file.archive_path.is_empty() {
                check_archive_path(&file.archive_path)?;
            }
            parse_mode(&file.mode)?;
        }
        if let Some(hooks) = &self.hooks {
            for script in [&hooks.server_pre, &hooks.server_post].into_iter().flatten() {
                check_archive_path(script)?;
            }
        }
        if let Some(unit) = &self.systemd {
            check_archive_path(&unit.unit_archive_path)?;
            let dest = Path::new(&unit.unit_dest);
            if !UNIT_SEARCH_DIRS.iter().any(|dir| dest.starts_with(dir)) {
                return Err(Error::InvalidManifest(format!(
                    "unit destination {:?} is outside the systemd unit directories",
                    unit.unit_dest
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(dest: &str, archive_path: &str) -> FileEntry {
        FileEntry {
            archive_path: archive_path.to_string(),
            dest: dest.to_string(),
            mode: "0644".to_string(),
            hash: Fingerprint::of_bytes(dest.as_bytes()),
        }
    }

    #[test]
    fn manifest_wire_shape() {
        let manifest = Manifest {
            name: "web".to_string(),
            files: vec![entry("/opt/app/bin", "files/0/bin")],
            hooks: Some(Hooks {
                server_pre: Some("scripts/pre-deploy.sh".to_string()),
                server_post: None,
            }),
            systemd: Some(SystemdUnit {
                unit_archive_path: "files/systemd/web.service".to_string(),
                unit_dest: "/etc/systemd/system/web.service".to_string(),
                enable: true,
                restart: false,
            }),
            inventory: None,
        };

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["name"], "web");
        assert_eq!(value["files"][0]["archive_path"], "files/0/bin");
        assert_eq!(value["files"][0]["dest"], "/opt/app/bin");
        assert_eq!(value["files"][0]["mode"], "0644");
        assert_eq!(value["hooks"]["server_pre"], "scripts/pre-deploy.sh");
        assert!(value["hooks"].get("server_post").is_none());
        assert_eq!(value["systemd"]["unit_dest"], "/etc/systemd/system/web.service");
        assert!(value.get("inventory").is_none());
    }

    #[test]
    fn inventory_wire_shape() {
        let value = json!({
            "packages": ["nginx", "curl"],
            "services": [
                {"name": "api", "enabled": true, "state": "started", "env": {"PORT": "8080"}}
            ],
            "users": [{"name": "deploy", "home": "/home/deploy"}]
        });
        let inventory: Inventory = serde_json::from_value(value).unwrap();
        assert_eq!(inventory.packages, vec!["nginx", "curl"]);
        assert_eq!(inventory.services[0].state, ServiceState::Started);
        assert_eq!(inventory.services[0].env["PORT"], "8080");
        assert_eq!(inventory.users[0].home.as_deref(), Some("/home/deploy"));
        assert!(inventory.users[0].shell.is_none());
    }

    #[test]
    fn validate_rejects_relative_dest() {
        let manifest = Manifest {
            name: "web".to_string(),
            files: vec![entry("opt/app/bin", "files/0/bin")],
            hooks: None,
            systemd: None,
            inventory: None,
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let manifest = Manifest {
            name: "  ".to_string(),
            files: vec![],
            hooks: None,
            systemd: None,
            inventory: None,
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn validate_rejects_unit_outside_search_dirs() {
        let manifest = Manifest {
            name: "web".to_string(),
            files: vec![],
            hooks: None,
            systemd: Some(SystemdUnit {
                unit_archive_path: "files/systemd/web.service".to_string(),
                unit_dest: "/opt/web.service".to_string(),
                enable: false,
                restart: false,
            }),
            inventory: None,
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn validate_rejects_escaping_archive_paths() {
        for bad in ["../evil.sh", "/abs/evil.sh", "scripts/../../evil.sh"] {
            let manifest = Manifest {
                name: "web".to_string(),
                files: vec![],
                hooks: Some(Hooks {
                    server_pre: Some(bad.to_string()),
                    server_post: None,
                }),
                systemd: None,
                inventory: None,
            };
            assert!(manifest.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn validate_accepts_delta_skip_entries() {
        let manifest = Manifest {
            name: "web".to_string(),
            files: vec![entry("/opt/app/bin", "")],
            hooks: None,
            systemd: None,
            inventory: None,
        };
        manifest.validate().unwrap();
    }

    #[test]
    fn parse_mode_defaults_and_rejects() {
        assert_eq!(parse_mode("").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert!(parse_mode("rwx").is_err());
        assert!(parse_mode("0999").is_err());
    }
}
