//! Persisted inventory state: per-project stored inventory and the
//! host-global package-owners registry.

use gangway_core::manifest::Inventory;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("reading {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Host-global map from package name to the projects that declare it.
///
/// Invariant: for every package, the owner set equals exactly the set of
/// projects whose stored inventory contains that package.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnersRegistry {
    #[serde(default)]
    pub package_owners: BTreeMap<String, Vec<String>>,
}

impl OwnersRegistry {
    /// Projects currently declaring `package`.
    pub fn owners(&self, package: &str) -> &[String] {
        self.package_owners
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Record `project` as owner of every desired package and drop it from
    /// the packages it no longer declares, erasing keys left without owners.
    pub fn update_ownership(
        &mut self,
        project: &str,
        desired: &BTreeSet<String>,
        stored: &BTreeSet<String>,
    ) {
        for package in desired {
            let owners = self.package_owners.entry(package.clone()).or_default();
            if !owners.iter().any(|p| p == project) {
                owners.push(project.to_string());
            }
        }
        for package in stored.difference(desired) {
            if let Some(owners) = self.package_owners.get_mut(package) {
                owners.retain(|p| p != project);
                if owners.is_empty() {
                    self.package_owners.remove(package);
                }
            }
        }
    }

    /// Forget a package entirely, after it has been removed from the system.
    pub fn erase(&mut self, package: &str) {
        self.package_owners.remove(package);
    }
}

/// Store for the two long-lived inventory documents under the state root.
///
/// The reconciler's load → diff → apply → persist transaction runs under
/// [`InventoryStore::lock`]; the store is the sole writer of these files.
#[derive(Clone)]
pub struct InventoryStore {
    root: Arc<PathBuf>,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl InventoryStore {
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            root: Arc::new(state_dir),
            lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Serialize a whole reconciliation transaction.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    fn inventory_path(&self, project: &str) -> PathBuf {
        self.root.join(project).join("inventory.json")
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join(".global").join("package-owners.json")
    }

    /// The last successfully applied inventory, or the empty default when
    /// the project has never deployed one.
    pub async fn load_stored(&self, project: &str) -> Result<Inventory, StateError> {
        read_json_or_default(self.inventory_path(project)).await
    }

    /// Atomically replace the stored inventory.
    pub async fn save_stored(&self, project: &str, inventory: &Inventory) -> Result<(), StateError> {
        write_json_atomic(self.inventory_path(project), inventory).await
    }

    pub async fn load_registry(&self) -> Result<OwnersRegistry, StateError> {
        read_json_or_default(self.registry_path()).await
    }

    pub async fn save_registry(&self, registry: &OwnersRegistry) -> Result<(), StateError> {
        write_json_atomic(self.registry_path(), registry).await
    }
}

async fn read_json_or_default<T: DeserializeOwned + Default>(path: PathBuf) -> Result<T, StateError> {
    match fs::read(&path).await {
        Ok(data) => serde_json::from_slice(&data).map_err(|source| StateError::Decode { path, source }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(source) => Err(StateError::Read { path, source }),
    }
}

/// Pretty-print to a temp file next to the target, then rename over it.
async fn write_json_atomic<T: Serialize>(path: PathBuf, value: &T) -> Result<(), StateError> {
    let data = serde_json::to_vec_pretty(value).map_err(|source| StateError::Decode {
        path: path.clone(),
        source,
    })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| StateError::Write {
                path: path.clone(),
                source,
            })?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &data).await.map_err(|source| StateError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, &path).await.map_err(|source| StateError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gangway_core::manifest::{Service, ServiceState};

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn stored_inventory_roundtrip() {
        let scratch = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(scratch.path().to_path_buf());

        // Never-deployed projects read back as empty.
        assert_eq!(store.load_stored("web").await.unwrap(), Inventory::default());

        let inventory = Inventory {
            packages: vec!["nginx".to_string()],
            services: vec![Service {
                name: "api".to_string(),
                enabled: true,
                state: ServiceState::Started,
                env: Default::default(),
            }],
            users: vec![],
        };
        store.save_stored("web", &inventory).await.unwrap();
        assert_eq!(store.load_stored("web").await.unwrap(), inventory);

        // Pretty-printed JSON at the documented path, no temp file left over.
        let path = scratch.path().join("web/inventory.json");
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\n  \"packages\""));
        assert!(!scratch.path().join("web/inventory.json.tmp").exists());
    }

    #[tokio::test]
    async fn registry_roundtrip_and_wire_shape() {
        let scratch = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(scratch.path().to_path_buf());

        let mut registry = OwnersRegistry::default();
        registry.update_ownership("alpha", &set(&["nginx", "curl"]), &set(&[]));
        store.save_registry(&registry).await.unwrap();

        let raw =
            std::fs::read_to_string(scratch.path().join(".global/package-owners.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["package_owners"]["nginx"][0], "alpha");

        assert_eq!(store.load_registry().await.unwrap(), registry);
    }

    #[test]
    fn ownership_follows_declarations() {
        let mut registry = OwnersRegistry::default();

        // alpha declares {nginx, curl}, then beta declares {curl}.
        registry.update_ownership("alpha", &set(&["nginx", "curl"]), &set(&[]));
        registry.update_ownership("beta", &set(&["curl"]), &set(&[]));
        assert_eq!(registry.owners("nginx"), ["alpha"]);
        assert_eq!(registry.owners("curl"), ["alpha", "beta"]);

        // alpha re-deploys without curl: beta keeps it alive.
        registry.update_ownership("alpha", &set(&["nginx"]), &set(&["nginx", "curl"]));
        assert_eq!(registry.owners("nginx"), ["alpha"]);
        assert_eq!(registry.owners("curl"), ["beta"]);

        // beta drops curl too: the key disappears.
        registry.update_ownership("beta", &set(&[]), &set(&["curl"]));
        assert!(registry.owners("curl").is_empty());
        assert!(!registry.package_owners.contains_key("curl"));
    }

    #[test]
    fn ownership_update_is_idempotent() {
        let mut registry = OwnersRegistry::default();
        let desired = set(&["nginx"]);
        registry.update_ownership("alpha", &desired, &set(&[]));
        registry.update_ownership("alpha", &desired, &desired);
        assert_eq!(registry.owners("nginx"), ["alpha"]);
    }
}
