// src/filesystem/path.rs

//! Path sanitization for untrusted relative paths
//!
//! Ignore-file entries and archive entry names come from the source tree
//! being built, so neither may be allowed to reach outside its root.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalise an untrusted path into a relative one
///
/// `.` components and leading slashes are dropped; any `..` component is a
/// traversal attempt and is rejected, as is a path that ends up empty.
///
/// ```
/// use art::filesystem::path::sanitize_path;
/// use std::path::PathBuf;
///
/// assert_eq!(sanitize_path("dist/app.jar").unwrap(), PathBuf::from("dist/app.jar"));
/// assert_eq!(sanitize_path("/dist/./app.jar").unwrap(), PathBuf::from("dist/app.jar"));
/// assert!(sanitize_path("../secrets").is_err());
/// ```
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(format!(
            "'{}' is empty after sanitization",
            path_str
        )));
    }

    Ok(normalized)
}

/// Join an untrusted relative path onto `root`
///
/// When both sides exist on disk the canonical result is also checked to
/// stay under the canonical root, which catches symlinks pointing outside.
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_path(path.as_ref())?;
    let joined = root.join(&sanitized);

    if let (Ok(canonical_root), Ok(canonical_joined)) =
        (root.canonicalize(), joined.canonicalize())
        && !canonical_joined.starts_with(&canonical_root)
    {
        return Err(Error::PathTraversal(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Validate a single file name such as an artefact or key file name
pub fn sanitize_filename(name: &str) -> Result<String> {
    if name.contains('/') || name.contains('\\') {
        return Err(Error::PathTraversal(format!(
            "file name contains a path separator: {}",
            name
        )));
    }
    if name == ".." || name == "." {
        return Err(Error::PathTraversal(format!("invalid file name: {}", name)));
    }
    if name.is_empty() {
        return Err(Error::InvalidPath("empty file name".to_string()));
    }
    Ok(name.to_string())
}
