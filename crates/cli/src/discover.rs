//! Project file discovery.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Mapping;

/// One local file destined for the host.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub src: PathBuf,
    pub dest: String,
    pub mode: String,
    /// Logical archive path, namespaced by mapping index:
    /// `files/<index>/<relative>`.
    pub archive_path: String,
}

/// Walk every mapping and collect the files to deploy.
pub fn discover_files(project_dir: &Path, mappings: &[Mapping]) -> Result<Vec<LocalFile>> {
    let mut files = Vec::new();
    for (index, mapping) in mappings.iter().enumerate() {
        let src_dir = project_dir.join(&mapping.src);
        let mut walker = WalkDir::new(&src_dir).sort_by_file_name().into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.with_context(|| format!("walking {}", src_dir.display()))?;
            let rel = match entry.path().strip_prefix(&src_dir) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };
            let rel_str = rel.to_string_lossy().into_owned();
            if entry.file_type().is_dir() {
                if should_exclude(&rel_str, true, &mapping.exclude) {
                    walker.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() || should_exclude(&rel_str, false, &mapping.exclude) {
                continue;
            }
            files.push(LocalFile {
                src: entry.into_path(),
                dest: format!("{}/{rel_str}", mapping.dest.trim_end_matches('/')),
                mode: mapping.mode.clone(),
                archive_path: format!("files/{index}/{rel_str}"),
            });
        }
    }
    Ok(files)
}

/// True when `rel` matches any exclude pattern.
///
/// Patterns ending in `/` match a directory and everything under it; other
/// patterns match the basename as a glob, the whole relative path exactly,
/// or any path under that prefix.
pub fn should_exclude(rel: &str, is_dir: bool, excludes: &[String]) -> bool {
    for pattern in excludes {
        if let Some(dir_pattern) = pattern.strip_suffix('/') {
            let under = format!("{dir_pattern}/");
            if is_dir && (rel == dir_pattern || rel.starts_with(&under)) {
                return true;
            }
            if rel.starts_with(&under) {
                return true;
            }
            continue;
        }

        let basename = rel.rsplit('/').next().unwrap_or(rel);
        if glob_match(pattern, basename) {
            return true;
        }

        if rel == pattern || rel.starts_with(&format!("{pattern}/")) {
            return true;
        }
    }
    false
}

/// Minimal glob over a basename: `*` matches any run, `?` one character.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn matches(pattern: &[u8], name: &[u8]) -> bool {
        match (pattern.first(), name.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                matches(&pattern[1..], name)
                    || (!name.is_empty() && matches(pattern, &name[1..]))
            }
            (Some(b'?'), Some(_)) => matches(&pattern[1..], &name[1..]),
            (Some(p), Some(n)) if p == n => matches(&pattern[1..], &name[1..]),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), name.as_bytes())
}
