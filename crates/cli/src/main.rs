//! gangway, the developer-side deployment client.
//!
//! `gangway deploy` packages the project per `.gangway/config.yaml`,
//! negotiates the delta with the daemon, ships only the stale files, and
//! watches the streamed log for the success sentinel. `gangway rollback`
//! asks the daemon to restore the pre-deployment snapshot.

mod api_client;
mod config;
mod discover;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gangway_core::archive::ArchiveWriter;
use gangway_core::hash::Fingerprint;
use gangway_core::manifest::{
    CheckRequest, FileEntry, FileHashEntry, Hooks, Manifest, SystemdUnit,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;

use api_client::ApiClient;
use config::ClientConfig;

#[derive(Parser)]
#[command(name = "gangway")]
#[command(about = "Two-sided continuous deployment for self-hosted Linux hosts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Package the project and deploy it to the configured host
    Deploy {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: String,
    },
    /// Restore the host to the pre-deployment snapshot
    Rollback {
        /// Project directory
        #[arg(long, default_value = ".")]
        dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Deploy { dir } => deploy(&dir).await,
        Commands::Rollback { dir } => rollback(&dir).await,
    }
}

/// The env var wins so tokens can stay out of checked-in config files.
fn resolve_token(config: &ClientConfig) -> Result<String> {
    if let Ok(token) = std::env::var("GANGWAY_TOKEN") {
        if !token.is_empty() {
            return Ok(token);
        }
    }
    if let Some(token) = &config.token {
        if !token.is_empty() {
            eprintln!(
                "warning: token is hardcoded in .gangway/config.yaml — consider using GANGWAY_TOKEN instead"
            );
            return Ok(token.clone());
        }
    }
    anyhow::bail!("no auth token: set GANGWAY_TOKEN or add 'token:' to .gangway/config.yaml")
}

async fn deploy(dir: &str) -> Result<()> {
    let project_dir = std::fs::canonicalize(dir).context("resolving project dir")?;
    let config = ClientConfig::load(&project_dir)?;
    let token = resolve_token(&config)?;
    let client = ApiClient::new(&config.server, &token)?;

    if let Some(script) = &config.hooks.local_pre {
        let path = project_dir.join(script);
        println!("[gangway] Running local pre-hook: {}", path.display());
        run_local_script(&path).await?;
    }

    let files = discover::discover_files(&project_dir, &config.deploy.mappings)?;

    let mut check_files = Vec::with_capacity(files.len());
    let mut hashes: HashMap<String, Fingerprint> = HashMap::with_capacity(files.len());
    for file in &files {
        let hash = Fingerprint::of_file(&file.src)
            .with_context(|| format!("hashing {}", file.src.display()))?;
        check_files.push(FileHashEntry {
            dest: file.dest.clone(),
            hash: hash.clone(),
        });
        hashes.insert(file.dest.clone(), hash);
    }

    let check = client
        .check(&CheckRequest {
            name: config.name.clone(),
            files: check_files,
        })
        .await?;
    let needed: HashSet<&str> = check.upload.iter().map(String::as_str).collect();
    println!("[gangway] Files to upload: {} / {}", needed.len(), files.len());

    // Manifest lists every file; the archive carries only the upload set
    // plus hook scripts and the optional unit file.
    let mut manifest = Manifest {
        name: config.name.clone(),
        files: Vec::new(),
        hooks: None,
        systemd: None,
        inventory: None,
    };
    let mut writer = ArchiveWriter::new(Vec::new());

    for file in &files {
        let mut entry = FileEntry {
            archive_path: String::new(),
            dest: file.dest.clone(),
            mode: file.mode.clone(),
            hash: hashes[&file.dest].clone(),
        };
        if needed.contains(file.dest.as_str()) {
            writer
                .add_file(&file.src, &file.archive_path, 0o644)
                .with_context(|| format!("adding {}", file.src.display()))?;
            entry.archive_path = file.archive_path.clone();
        }
        manifest.files.push(entry);
    }

    if config.hooks.server_pre.is_some() || config.hooks.server_post.is_some() {
        let mut hooks = Hooks::default();
        if let Some(script) = &config.hooks.server_pre {
            let archive_path = "scripts/pre-deploy.sh";
            writer
                .add_file(&project_dir.join(script), archive_path, 0o755)
                .context("adding pre-deploy script")?;
            hooks.server_pre = Some(archive_path.to_string());
        }
        if let Some(script) = &config.hooks.server_post {
            let archive_path = "scripts/post-deploy.sh";
            writer
                .add_file(&project_dir.join(script), archive_path, 0o755)
                .context("adding post-deploy script")?;
            hooks.server_post = Some(archive_path.to_string());
        }
        manifest.hooks = Some(hooks);
    }

    if let Some(systemd) = &config.deploy.systemd {
        let unit_path = project_dir.join(&systemd.unit);
        let unit_name = unit_path
            .file_name()
            .and_then(|name| name.to_str())
            .context("systemd unit path has no file name")?
            .to_string();
        let archive_path = format!("files/systemd/{unit_name}");
        writer
            .add_file(&unit_path, &archive_path, 0o644)
            .with_context(|| format!("adding unit file {}", unit_path.display()))?;
        manifest.systemd = Some(SystemdUnit {
            unit_archive_path: archive_path,
            unit_dest: format!("/etc/systemd/system/{unit_name}"),
            enable: systemd.enable,
            restart: systemd.restart,
        });
    }

    manifest.inventory = config::load_inventory(&project_dir)?;

    let archive = writer.finish().context("finalizing archive")?;
    let manifest_json = serde_json::to_vec(&manifest).context("encoding manifest")?;

    println!("[gangway] Deploying {} → {}", config.name, config.server);
    let mut stdout = std::io::stdout();
    client.deploy(manifest_json, archive, &mut stdout).await
}

async fn rollback(dir: &str) -> Result<()> {
    let project_dir = std::fs::canonicalize(dir).context("resolving project dir")?;
    let config = ClientConfig::load(&project_dir)?;
    let token = resolve_token(&config)?;
    let client = ApiClient::new(&config.server, &token)?;

    let mut stdout = std::io::stdout();
    client.rollback(&config.name, &mut stdout).await
}

async fn run_local_script(script: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755));
    let status = tokio::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(script.display().to_string())
        .status()
        .await
        .with_context(|| format!("running {}", script.display()))?;
    if !status.success() {
        anyhow::bail!("local pre-hook failed: {status}");
    }
    Ok(())
}
