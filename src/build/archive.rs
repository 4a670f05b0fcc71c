// src/build/archive.rs

//! Ignore filtering and archiving of build targets
//!
//! `.artignore` lists paths, relative to the source root, that must not end
//! up in an archive. In a private copy they are deleted before any command
//! runs. When building in place nothing is deleted; the same entries are
//! left out while zipping instead.

use crate::error::{Error, Result};
use crate::filesystem::path::safe_join;
use crate::filesystem::remove_path;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::FileOptions;

/// Name of the ignore list in the source root
pub const IGNORE_FILE: &str = ".artignore";

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Paths excluded from archiving
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    entries: Vec<PathBuf>,
}

impl IgnoreList {
    /// Read `<root>/.artignore`; a missing file gives a list holding only itself
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(IGNORE_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No {} in {}", IGNORE_FILE, root.display());
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(root, &content)
    }

    /// Resolve each non-blank, non-comment line against `root`
    pub fn parse(root: &Path, content: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for line in content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
        {
            entries.push(safe_join(root, line)?);
        }
        entries.push(root.join(IGNORE_FILE));
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Whether `path` is an entry or lies under one
    pub fn excludes(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| path.starts_with(e))
    }

    /// Delete every listed path that exists
    pub fn remove_all(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in &self.entries {
            match remove_path(entry) {
                Ok(()) => {
                    debug!("Removed ignored {}", entry.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::IoError(format!(
                        "cannot remove ignored {}: {}",
                        entry.display(),
                        e
                    )));
                }
            }
        }
        if removed > 0 {
            info!("Removed {} ignored paths", removed);
        }
        Ok(removed)
    }
}

/// Whether the file starts with the zip local-header signature
pub fn is_zip(path: &Path) -> Result<bool> {
    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == ZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Package `target` as the zip archive `dest`
///
/// A directory is zipped under its own name. A file that already is a zip
/// archive is copied unchanged when `reuse_archives` is set; any other file
/// is wrapped. Returns whether the target was reused as-is.
pub fn archive_target(
    target: &Path,
    dest: &Path,
    ignore: &IgnoreList,
    reuse_archives: bool,
) -> Result<bool> {
    let metadata = fs::metadata(target)
        .map_err(|_| Error::TargetNotFound(target.display().to_string()))?;

    if metadata.is_file() && reuse_archives && is_zip(target)? {
        fs::copy(target, dest)?;
        info!("Target {} already is an archive", target.display());
        return Ok(true);
    }

    zip_path(target, dest, ignore)?;
    Ok(false)
}

fn zip_path(source: &Path, dest: &Path, ignore: &IgnoreList) -> Result<()> {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?;

    let file = File::create(dest)?;
    let mut zip = zip::ZipWriter::new(file);
    let mut entries = 0usize;

    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !ignore.excludes(e.path()));
    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::IoError(format!("cannot walk {}: {}", source.display(), e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| Error::InvalidPath(e.to_string()))?;
        let name = if relative.as_os_str().is_empty() {
            base.clone()
        } else {
            Path::new(&base).join(relative).to_string_lossy().replace('\\', "/")
        };
        let mode = entry_mode(&entry)?;

        if entry.file_type().is_dir() {
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .unix_permissions(mode);
            zip.add_directory(format!("{}/", name), options)
                .map_err(zip_err)?;
        } else if entry.file_type().is_file() {
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(mode)
                .large_file(entry.metadata().map_err(io::Error::from)?.len() >= u32::MAX as u64);
            zip.start_file(name, options).map_err(zip_err)?;
            let mut input = File::open(entry.path())?;
            io::copy(&mut input, &mut zip)?;
            entries += 1;
        } else {
            warn!("Skipping {} (not a regular file)", entry.path().display());
        }
    }

    zip.finish().map_err(zip_err)?;
    info!("Archived {} files from {}", entries, source.display());
    Ok(())
}

#[cfg(unix)]
fn entry_mode(entry: &walkdir::DirEntry) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(entry.metadata().map_err(io::Error::from)?.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn entry_mode(entry: &walkdir::DirEntry) -> Result<u32> {
    Ok(if entry.file_type().is_dir() { 0o755 } else { 0o644 })
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::IoError(format!("zip error: {}", e))
}
