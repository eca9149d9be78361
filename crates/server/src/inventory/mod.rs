//! Inventory reconciliation: packages, services, users.
//!
//! A reconciliation is a transaction over the project's stored inventory
//! and the host-global owners registry: load, diff, apply, persist. The
//! deployment lock already serializes whole deployments; the store's own
//! lock keeps the registry consistent regardless of the caller.

pub mod packages;
pub mod services;
pub mod state;
pub mod users;

use gangway_core::manifest::Inventory;
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::exec::CommandError;
use crate::stream::LogSink;
use packages::{diff_packages, PackageManager};
use state::{InventoryStore, StateError};

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("no supported package manager found (tried apt-get, dnf, yum, pacman)")]
    NoPackageManager,

    #[error("installing packages: {0}")]
    Install(#[source] CommandError),

    #[error("env drop-in for {service}: {source}")]
    Dropin {
        service: String,
        #[source]
        source: io::Error,
    },

    #[error("reconciling service {service}: {source}")]
    Service {
        service: String,
        #[source]
        source: CommandError,
    },

    #[error("ensuring user {user}: {source}")]
    User {
        user: String,
        #[source]
        source: CommandError,
    },

    #[error("persisting inventory state: {0}")]
    Persist(#[from] StateError),
}

/// Brings the host in line with a project's desired inventory.
pub struct Reconciler {
    store: InventoryStore,
    unit_dir: PathBuf,
}

impl Reconciler {
    pub fn new(store: InventoryStore, unit_dir: PathBuf) -> Self {
        Self { store, unit_dir }
    }

    /// Run one reconciliation transaction for `project`.
    pub async fn reconcile(
        &self,
        project: &str,
        desired: &Inventory,
        sink: &LogSink,
    ) -> Result<(), InventoryError> {
        let _guard = self.store.lock().await;

        let stored = self.store.load_stored(project).await?;
        let mut registry = self.store.load_registry().await?;

        let desired_pkgs: BTreeSet<String> = desired.packages.iter().cloned().collect();
        let stored_pkgs: BTreeSet<String> = stored.packages.iter().cloned().collect();
        let (to_add, to_remove) = diff_packages(&desired_pkgs, &stored_pkgs);

        if to_add.is_empty() && to_remove.is_empty() {
            registry.update_ownership(project, &desired_pkgs, &stored_pkgs);
        } else {
            // Detection is deferred until a package actually has to change,
            // so package-free inventories reconcile on any host.
            let manager = PackageManager::detect().ok_or(InventoryError::NoPackageManager)?;

            if !to_add.is_empty() {
                sink.line(format!("Installing packages: {}", to_add.join(", ")));
                if let Err(e) = manager.refresh_index(sink).await {
                    sink.warn(format!("package index update failed: {e}"));
                }
                // Installs are precondition-critical: later phases may
                // depend on the binaries.
                manager
                    .install(sink, &to_add)
                    .await
                    .map_err(InventoryError::Install)?;
            }

            // Ownership is updated only after a successful install, so a
            // half-run state cannot claim a package that was never installed.
            registry.update_ownership(project, &desired_pkgs, &stored_pkgs);

            for package in &to_remove {
                let owners = registry.owners(package);
                if !owners.is_empty() {
                    sink.line(format!(
                        "Skipping removal of {package} (still needed by: {})",
                        owners.join(", ")
                    ));
                    continue;
                }
                sink.line(format!("Removing package: {package}"));
                if let Err(e) = manager.remove(sink, package).await {
                    // Removes are best-effort: a lingering package never
                    // blocks a deployment.
                    sink.warn(format!("could not remove {package}: {e}"));
                }
                registry.erase(package);
            }
        }

        // Declared order, so a dependency can be reconciled before its
        // dependent.
        for service in &desired.services {
            services::reconcile_service(sink, &self.unit_dir, service).await?;
        }

        for user in &desired.users {
            users::ensure_user(sink, user).await?;
        }

        self.store.save_stored(project, desired).await?;
        self.store.save_registry(&registry).await?;
        Ok(())
    }
}
