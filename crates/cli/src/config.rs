//! Client-side project configuration.

use anyhow::{Context, Result};
use figment::providers::{Format, Yaml};
use figment::Figment;
use gangway_core::manifest::Inventory;
use serde::Deserialize;
use std::path::Path;

/// `.gangway/config.yaml` at the project root.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Project name; keys the per-project state on the host.
    pub name: String,
    /// Daemon base URL, e.g. `http://10.0.0.5:8765`.
    pub server: String,
    /// Auth token. Prefer the GANGWAY_TOKEN env var over this field.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub deploy: DeploySection,
    #[serde(default)]
    pub hooks: HooksSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploySection {
    #[serde(default)]
    pub mappings: Vec<Mapping>,
    #[serde(default)]
    pub systemd: Option<SystemdSection>,
}

/// One source directory shipped to one destination directory.
#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    pub src: String,
    pub dest: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemdSection {
    /// Unit file path relative to the project root.
    pub unit: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub restart: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksSection {
    #[serde(default)]
    pub local_pre: Option<String>,
    #[serde(default)]
    pub server_pre: Option<String>,
    #[serde(default)]
    pub server_post: Option<String>,
}

impl ClientConfig {
    /// Load `.gangway/config.yaml` from the project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(".gangway").join("config.yaml");
        if !path.exists() {
            anyhow::bail!(
                "no client config at {} (run from a project with a .gangway directory)",
                path.display()
            );
        }
        let config: Self = Figment::from(Yaml::file(&path))
            .extract()
            .with_context(|| format!("parsing {}", path.display()))?;
        if config.name.is_empty() {
            anyhow::bail!("{}: 'name' is required", path.display());
        }
        if config.server.is_empty() {
            anyhow::bail!("{}: 'server' is required", path.display());
        }
        Ok(config)
    }
}

/// Load `.gangway/inventory.yaml` when present.
pub fn load_inventory(project_dir: &Path) -> Result<Option<Inventory>> {
    let path = project_dir.join(".gangway").join("inventory.yaml");
    if !path.exists() {
        return Ok(None);
    }
    let inventory: Inventory = Figment::from(Yaml::file(&path))
        .extract()
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(inventory))
}
