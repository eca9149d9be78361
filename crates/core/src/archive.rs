//! Streamed gzip tape archives of regular files.
//!
//! Entries are named by *logical archive paths* chosen by the producer
//! (`files/<mapping-index>/<relative>`, `files/systemd/<unit>`,
//! `scripts/pre-deploy.sh`, `scripts/post-deploy.sh`), never by filesystem
//! paths. This is not a general tar implementation: only regular files and
//! directories are honoured, everything else is skipped.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::Result;

/// Writer half of the codec.
pub struct ArchiveWriter<W: Write> {
    builder: tar::Builder<GzEncoder<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            builder: tar::Builder::new(GzEncoder::new(writer, Compression::default())),
        }
    }

    /// Append one regular file under the given logical archive path.
    pub fn add_file(&mut self, src: &Path, archive_path: &str, mode: u32) -> Result<()> {
        let mut file = File::open(src)?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(file.metadata()?.len());
        header.set_mode(mode);
        self.builder.append_data(&mut header, archive_path, &mut file)?;
        Ok(())
    }

    /// Finish the tar stream and flush the gzip trailer.
    pub fn finish(self) -> Result<W> {
        let encoder = self.builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

/// Unpack a gzip tape archive under `root`.
///
/// Every entry name is lexically cleaned and joined under `root`; any entry
/// that would resolve outside the root is skipped silently rather than
/// aborting extraction. Directory entries create directories, regular
/// entries create files with the stored mode, all other entry types are
/// skipped.
pub fn extract<R: Read>(reader: R, root: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let Some(rel) = clean_entry_path(&name) else {
            continue;
        };
        let target = root.join(&rel);
        if !target.starts_with(root) {
            continue;
        }
        match entry.header().entry_type() {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target)?;
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mode = entry.header().mode().unwrap_or(0o644);
                let mut out = open_with_mode(&target, mode)?;
                io::copy(&mut entry, &mut out)?;
            }
            _ => {}
        }
    }
    Ok(())
}

fn open_with_mode(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

/// Lexically clean an entry name: drop root and `.` components, resolve
/// `..` without ever escaping. Entries that would escape clean to `None`.
fn clean_entry_path(name: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => {}
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}
