//! Package reconciliation.

use std::collections::BTreeSet;
use std::path::Path;

use crate::exec::{run_logged_env, CommandError};
use crate::stream::LogSink;

/// A supported system package manager, detected by probing PATH in
/// preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    AptGet,
    Dnf,
    Yum,
    Pacman,
}

const PROBE_ORDER: &[PackageManager] = &[
    PackageManager::AptGet,
    PackageManager::Dnf,
    PackageManager::Yum,
    PackageManager::Pacman,
];

impl PackageManager {
    pub fn command(self) -> &'static str {
        match self {
            Self::AptGet => "apt-get",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Pacman => "pacman",
        }
    }

    /// Probe PATH for a supported package manager.
    pub fn detect() -> Option<Self> {
        PROBE_ORDER
            .iter()
            .copied()
            .find(|pm| command_in_path(pm.command()))
    }

    /// Refresh the package index where the manager separates that step.
    /// pacman refreshes as part of install.
    pub async fn refresh_index(self, sink: &LogSink) -> Result<(), CommandError> {
        match self {
            Self::AptGet => run_pkg(sink, "apt-get", &["update", "-qq"]).await,
            Self::Dnf | Self::Yum => run_pkg(sink, self.command(), &["makecache", "-q"]).await,
            Self::Pacman => Ok(()),
        }
    }

    /// Install all packages in one invocation.
    pub async fn install(self, sink: &LogSink, packages: &[String]) -> Result<(), CommandError> {
        let mut args: Vec<&str> = match self {
            Self::AptGet | Self::Dnf | Self::Yum => vec!["install", "-y"],
            Self::Pacman => vec!["-S", "--noconfirm"],
        };
        args.extend(packages.iter().map(String::as_str));
        run_pkg(sink, self.command(), &args).await
    }

    pub async fn remove(self, sink: &LogSink, package: &str) -> Result<(), CommandError> {
        let args: Vec<&str> = match self {
            Self::AptGet | Self::Dnf | Self::Yum => vec!["remove", "-y", package],
            Self::Pacman => vec!["-R", "--noconfirm", package],
        };
        run_pkg(sink, self.command(), &args).await
    }
}

async fn run_pkg(sink: &LogSink, program: &str, args: &[&str]) -> Result<(), CommandError> {
    run_logged_env(sink, program, args, &[("DEBIAN_FRONTEND", "noninteractive")]).await
}

fn command_in_path(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(name)))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Packages to install (desired minus stored) and candidates for removal
/// (stored minus desired), in sorted order.
pub fn diff_packages(
    desired: &BTreeSet<String>,
    stored: &BTreeSet<String>,
) -> (Vec<String>, Vec<String>) {
    let to_add = desired.difference(stored).cloned().collect();
    let to_remove = stored.difference(desired).cloned().collect();
    (to_add, to_remove)
}
