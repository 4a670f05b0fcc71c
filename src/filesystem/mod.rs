// src/filesystem/mod.rs

//! Filesystem helpers shared by the stager, the archiver and the registry
//!
//! - [`path`]: sanitising untrusted relative paths
//! - [`copy_tree`]: recursive copy that keeps file modes
//! - [`move_file_atomic`]: rename with a cross-device fallback

pub mod path;

use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Move a file, falling back to copy + fsync + delete across filesystems
///
/// `rename(2)` fails with `EXDEV` when the build working directory and the
/// registry home sit on different mounts.
pub fn move_file_atomic(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
            debug!(
                "Cross-filesystem move ({} -> {}), copying",
                src.display(),
                dst.display()
            );

            fs::copy(src, dst)?;
            let file = File::open(dst)?;
            file.sync_all()?;
            drop(file);

            // not every filesystem supports fsync on a directory
            if let Some(parent) = dst.parent()
                && let Ok(dir) = File::open(parent)
            {
                let _ = dir.sync_all();
            }

            fs::remove_file(src)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Recursively copy the contents of `src` into `dst`
///
/// File permission bits are carried over by `fs::copy`; directories get the
/// source directory's mode and symlinks are recreated, not followed. When
/// `dst` lies inside `src` the branch holding it is not copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0u64;

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(dst) && !dst.starts_with(e.path()));
    for entry in walker {
        let entry = entry.map_err(|e| Error::IoError(format!("Failed to walk {}: {}", src.display(), e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::InvalidPath(e.to_string()))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            fs::set_permissions(&target, entry.metadata().map_err(io::Error::from)?.permissions())?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)?;
            #[cfg(not(unix))]
            fs::copy(entry.path().parent().unwrap_or(src).join(link), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    debug!("Copied {} files from {} to {}", copied, src.display(), dst.display());
    Ok(copied)
}

/// Remove a file or a directory tree
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Format a byte count the way `ls -h` does
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file_atomic() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("a.zip");
        let dst = temp_dir.path().join("b.zip");
        fs::write(&src, b"zip").unwrap();

        move_file_atomic(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"zip");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_preserves_modes() {
        use std::os::unix::fs::PermissionsExt;

        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("bin")).unwrap();
        let script = src.path().join("bin/run.sh");
        fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(src.path().join("README"), "readme").unwrap();

        let copied = copy_tree(src.path(), &dst.path().join("out")).unwrap();
        assert_eq!(copied, 2);

        let mode = fs::metadata(dst.path().join("out/bin/run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
        assert_eq!(
            fs::read_to_string(dst.path().join("out/README")).unwrap(),
            "readme"
        );
    }

    #[test]
    fn test_copy_tree_skips_nested_destination() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("package.yaml"), "profiles: []").unwrap();
        let dst = src.path().join(".work/art");

        assert_eq!(copy_tree(src.path(), &dst).unwrap(), 1);
        assert!(dst.join("package.yaml").exists());
        assert!(!dst.join(".work").exists());
    }

    #[test]
    fn test_remove_path() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("cache");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested/file"), "x").unwrap();
        let file = temp_dir.path().join("notes.txt");
        fs::write(&file, "x").unwrap();

        remove_path(&dir).unwrap();
        remove_path(&file).unwrap();
        assert!(!dir.exists());
        assert!(!file.exists());
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
