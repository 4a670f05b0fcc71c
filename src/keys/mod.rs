// src/keys/mod.rs

//! Key resolution across tenants
//!
//! Keys live in a tree under `<home>/keys`:
//!
//! ```text
//! keys/
//!   root_rsa_key.pgp            root pair, used when nothing else matches
//!   root_rsa_pub.pgp
//!   acme/
//!     acme_rsa_key.pgp          group pair
//!     web/
//!       acme_web_rsa_key.pgp    group + name pair
//! ```
//!
//! A [`KeyIndex`] is built once by scanning that tree and then answers
//! lookups for package paths without touching the directory again.

use crate::crypto::PgpKey;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extension of key files
pub const KEY_EXTENSION: &str = "pgp";

/// File name stem of the fallback pair
pub const ROOT_KEY_STEM: &str = "root";

/// Suffix of a key file name for the given key class
pub fn key_suffix(private: bool) -> &'static str {
    if private {
        "_rsa_key.pgp"
    } else {
        "_rsa_pub.pgp"
    }
}

/// Index of key-bearing folders under a keys directory
#[derive(Debug, Clone)]
pub struct KeyIndex {
    root: PathBuf,
    /// Relative folder paths, longest first
    prefixes: Vec<String>,
}

impl KeyIndex {
    /// Scan `keys_dir` for folders holding `.pgp` files
    ///
    /// A missing directory yields an index with only the root fallback.
    pub fn scan(keys_dir: &Path) -> Result<Self> {
        let mut prefixes = Vec::new();

        if keys_dir.exists() {
            for entry in WalkDir::new(keys_dir).min_depth(1) {
                let entry = entry.map_err(|e| {
                    Error::IoError(format!("cannot scan {}: {}", keys_dir.display(), e))
                })?;
                if !entry.file_type().is_file()
                    || entry.path().extension().and_then(|e| e.to_str()) != Some(KEY_EXTENSION)
                {
                    continue;
                }
                let Some(folder) = entry.path().parent() else {
                    continue;
                };
                let Ok(relative) = folder.strip_prefix(keys_dir) else {
                    continue;
                };
                // keys directly under the root belong to the fallback pair
                if relative.as_os_str().is_empty() {
                    continue;
                }
                let prefix = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if !prefixes.contains(&prefix) {
                    prefixes.push(prefix);
                }
            }
        }

        debug!(
            "Indexed {} key prefixes under {}",
            prefixes.len(),
            keys_dir.display()
        );
        Ok(Self::from_prefixes(keys_dir, prefixes))
    }

    /// Build an index from known prefixes
    pub fn from_prefixes<S: Into<String>>(
        keys_dir: impl Into<PathBuf>,
        prefixes: impl IntoIterator<Item = S>,
    ) -> Self {
        let mut prefixes: Vec<String> = prefixes
            .into_iter()
            .map(Into::into)
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        prefixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        prefixes.dedup();
        Self {
            root: keys_dir.into(),
            prefixes,
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn keys_dir(&self) -> &Path {
        &self.root
    }

    /// Most specific prefix owning `package`, compared segment by segment
    ///
    /// `acme` owns `acme/web` but not `acmeweb`.
    pub fn matching_prefix(&self, package: &str) -> Option<&str> {
        let package = Path::new(package.trim_matches('/'));
        self.prefixes
            .iter()
            .find(|prefix| package.starts_with(Path::new(prefix.as_str())))
            .map(String::as_str)
    }

    /// Path of the key file that `package` resolves to
    pub fn key_path(&self, package: &str, private: bool) -> PathBuf {
        match self.matching_prefix(package) {
            Some(prefix) => self.root.join(prefix).join(format!(
                "{}{}",
                prefix.replace('/', "_"),
                key_suffix(private)
            )),
            None => self
                .root
                .join(format!("{}{}", ROOT_KEY_STEM, key_suffix(private))),
        }
    }

    /// Load the key for `package`
    pub fn resolve(&self, package: &str, private: bool, passphrase: Option<&str>) -> Result<PgpKey> {
        let path = self.key_path(package, private);
        if !path.exists() {
            return Err(Error::KeyFormat(format!(
                "no {} key for '{}' at {}",
                if private { "private" } else { "public" },
                package,
                path.display()
            )));
        }
        debug!("Resolved key for '{}' to {}", package, path.display());
        PgpKey::load(&path, passphrase)
    }
}

/// Key slot for a tenant
///
/// No group and no name is the root pair; a group alone is a group pair;
/// both give a group + name pair.
pub fn key_slot(keys_dir: &Path, group: Option<&str>, name: Option<&str>, private: bool) -> PathBuf {
    let group = group.map(|g| g.trim_matches('/')).filter(|g| !g.is_empty());
    let name = name.filter(|n| !n.is_empty());
    let suffix = key_suffix(private);

    match (group, name) {
        (None, _) => keys_dir.join(format!("{}{}", ROOT_KEY_STEM, suffix)),
        (Some(group), None) => keys_dir
            .join(group)
            .join(format!("{}{}", group.replace('/', "_"), suffix)),
        (Some(group), Some(name)) => keys_dir.join(group).join(name).join(format!(
            "{}_{}{}",
            group.replace('/', "_"),
            name,
            suffix
        )),
    }
}
