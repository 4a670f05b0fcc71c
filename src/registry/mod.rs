// src/registry/mod.rs

//! Local tag-addressed artefact registry
//!
//! The registry lives under a home directory:
//!
//! ```text
//! <home>/registry.json    repositories, artefacts and tags
//! <home>/<name>.zip       archive of each artefact
//! <home>/<name>.json      seal of each artefact
//! <home>/registry.lock    advisory lock file
//! ```
//!
//! Every mutation reloads the document under an in-process mutex and an
//! exclusive file lock, mutates it, and replaces the file with a renamed
//! temporary copy. Validation always happens before any file is moved or
//! rewritten, so a failed call leaves the document untouched. An add that
//! fails after moving files moves them back.

mod lock;
mod name;

pub use lock::RegistryLock;
pub use name::{LATEST, NameTag, derived_tag};

use crate::crypto::SealVerifier;
use crate::error::{Error, Result};
use crate::filesystem::move_file_atomic;
use crate::filesystem::path::{safe_join, sanitize_filename};
use crate::seal::Seal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry document file name
pub const REGISTRY_FILE: &str = "registry.json";

const LOCK_FILE: &str = "registry.lock";

/// Extension of artefact archives
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extension of seal sidecars
pub const SEAL_EXTENSION: &str = "json";

/// The persisted registry document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryDocument {
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub artefacts: Vec<Artefact>,
}

/// A stored artefact; its own content name is always one of its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artefact {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One row of [`Registry::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub repository: String,
    /// Tags other than the content name
    pub tags: Vec<String>,
    pub name: String,
    pub size: String,
    pub created: String,
}

impl RegistryDocument {
    pub fn repository(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    fn repository_mut(&mut self, name: &str) -> Option<&mut Repository> {
        self.repositories.iter_mut().find(|r| r.name == name)
    }

    /// Whether any repository still lists the artefact `name`
    pub fn references(&self, name: &str) -> bool {
        self.repositories
            .iter()
            .any(|r| r.artefacts.iter().any(|a| a.name == name))
    }

    /// Resolve a reference to `(repository, artefact)`
    ///
    /// The tag part may be a tag or a content name and defaults to `latest`.
    pub fn find(&self, reference: &NameTag) -> Option<(&Repository, &Artefact)> {
        let tag = reference.tag_or_latest();
        let repository = self.repository(&reference.repository)?;
        repository
            .artefacts
            .iter()
            .find(|a| a.name == tag || a.tags.iter().any(|t| t == tag))
            .map(|a| (repository, a))
    }
}

impl Repository {
    pub fn artefact(&self, name: &str) -> Option<&Artefact> {
        self.artefacts.iter().find(|a| a.name == name)
    }

    /// Attach `tag` to `artefact`, detaching it from every other artefact
    ///
    /// Content names are never moved.
    fn attach_tag(&mut self, artefact: &str, tag: &str) {
        for a in &mut self.artefacts {
            if a.name == artefact {
                if !a.tags.iter().any(|t| t == tag) {
                    a.tags.push(tag.to_string());
                }
            } else if tag != a.name && a.tags.iter().any(|t| t == tag) {
                debug!("Moving tag '{}' from {} to {}", tag, a.name, artefact);
                a.tags.retain(|t| t != tag);
            }
        }
    }
}

/// Handle on a registry home directory
pub struct Registry {
    home: PathBuf,
    guard: Mutex<()>,
}

impl Registry {
    /// Open the registry rooted at `home`, creating the directory if needed
    pub fn open(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        fs::create_dir_all(&home).map_err(|e| {
            Error::IoError(format!("cannot create registry home {}: {}", home.display(), e))
        })?;
        Ok(Self {
            home,
            guard: Mutex::new(()),
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.home.join(format!("{}.{}", name, ARCHIVE_EXTENSION))
    }

    pub fn seal_path(&self, name: &str) -> PathBuf {
        self.home.join(format!("{}.{}", name, SEAL_EXTENSION))
    }

    /// Read the current document
    pub fn load(&self) -> Result<RegistryDocument> {
        let path = self.home.join(REGISTRY_FILE);
        if !path.exists() {
            return Ok(RegistryDocument::default());
        }
        let content = fs::read(&path)
            .map_err(|e| Error::IoError(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_slice(&content)
            .map_err(|e| Error::ParseError(format!("corrupt registry {}: {}", path.display(), e)))
    }

    /// Add a sealed archive under `name_tag`
    ///
    /// The seal is expected next to the archive with the same stem. Without
    /// an explicit tag the artefact gets `latest`, or `latest-<profile>` when
    /// a profile is given.
    pub fn add(&self, archive: &Path, name_tag: &str, profile: Option<&str>) -> Result<Artefact> {
        if archive.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
            return Err(Error::RegistryFormat(format!(
                "{} is not a .{} archive",
                archive.display(),
                ARCHIVE_EXTENSION
            )));
        }
        let content_name = archive
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::RegistryFormat(format!("bad archive name {}", archive.display())))
            .and_then(|s| sanitize_filename(s).map_err(|e| Error::RegistryFormat(e.to_string())))?;
        let seal = archive.with_extension(SEAL_EXTENSION);
        if !seal.exists() {
            return Err(Error::RegistryFormat(format!(
                "seal {} not found next to the archive",
                seal.display()
            )));
        }

        let reference = NameTag::parse(name_tag)?;
        let tag = reference
            .tag
            .clone()
            .unwrap_or_else(|| derived_tag(profile));

        self.locked(|| {
            let mut doc = self.load()?;
            if let Some(repository) = doc.repository(&reference.repository)
                && repository.artefact(&content_name).is_some()
            {
                return Err(Error::DuplicateArtefact {
                    repository: reference.repository.clone(),
                    artefact: content_name.clone(),
                });
            }

            let stored_archive = self.archive_path(&content_name);
            let stored_seal = self.seal_path(&content_name);
            move_file_atomic(archive, &stored_archive)?;

            let added = move_file_atomic(&seal, &stored_seal)
                .map_err(Error::from)
                .and_then(|()| {
                    let artefact = record(&mut doc, &reference.repository, &content_name, &tag)?;
                    self.save(&doc)?;
                    Ok(artefact)
                });
            if added.is_err() {
                restore(&[
                    (archive, stored_archive.as_path()),
                    (seal.as_path(), stored_seal.as_path()),
                ]);
            }
            added
        })
    }

    /// Look up an artefact by repository and content name
    pub fn get(&self, repository: &str, artefact: &str) -> Result<Option<Artefact>> {
        Ok(self
            .load()?
            .repository(repository)
            .and_then(|r| r.artefact(artefact))
            .cloned())
    }

    /// Resolve `name[:tag]` to its repository name and artefact
    pub fn find(&self, reference: &str) -> Result<(String, Artefact)> {
        let reference = NameTag::parse(reference)?;
        let doc = self.load()?;
        doc.find(&reference)
            .map(|(r, a)| (r.name.clone(), a.clone()))
            .ok_or_else(|| Error::NotFound(reference.to_string()))
    }

    /// All artefacts, one row per repository entry
    pub fn list(&self) -> Result<Vec<ListEntry>> {
        let doc = self.load()?;
        let mut rows = Vec::new();
        for repository in &doc.repositories {
            for artefact in &repository.artefacts {
                let (size, created) = match Seal::load(&self.seal_path(&artefact.name)) {
                    Ok(seal) => (seal.manifest.size, seal.manifest.time),
                    Err(e) => {
                        warn!("Cannot read seal of {}: {}", artefact.name, e);
                        (String::new(), String::new())
                    }
                };
                rows.push(ListEntry {
                    repository: repository.name.clone(),
                    tags: artefact
                        .tags
                        .iter()
                        .filter(|t| **t != artefact.name)
                        .cloned()
                        .collect(),
                    name: artefact.name.clone(),
                    size,
                    created,
                });
            }
        }
        Ok(rows)
    }

    /// Tag the artefact `source` refers to as `target`
    ///
    /// When `target` names another repository the artefact is listed there
    /// too, backed by the same files. `target` without a tag means `latest`.
    pub fn tag(&self, source: &str, target: &str) -> Result<()> {
        let source = NameTag::parse(source)?;
        let target = NameTag::parse(target)?;
        let tag = target.tag_or_latest().to_string();

        self.mutate(|doc| {
            let name = doc
                .find(&source)
                .map(|(_, a)| a.name.clone())
                .ok_or_else(|| Error::NotFound(source.to_string()))?;

            if doc.repository(&target.repository).is_none() {
                doc.repositories.push(Repository {
                    name: target.repository.clone(),
                    artefacts: Vec::new(),
                });
            }
            let repository = doc
                .repository_mut(&target.repository)
                .ok_or_else(|| Error::NotFound(target.repository.clone()))?;
            if repository.artefact(&name).is_none() {
                repository.artefacts.push(Artefact {
                    name: name.clone(),
                    tags: vec![name.clone()],
                });
            }
            repository.attach_tag(&name, &tag);

            info!("Tagged {} as {}", name, target);
            Ok(())
        })
    }

    /// Remove the artefacts the references point to
    ///
    /// Archive and seal files are deleted once no repository lists the
    /// artefact any more; repositories left empty are dropped. Every
    /// reference is resolved before anything is removed.
    pub fn remove(&self, references: &[&str]) -> Result<Vec<String>> {
        let references = references
            .iter()
            .map(|r| NameTag::parse(r))
            .collect::<Result<Vec<_>>>()?;

        self.mutate(|doc| {
            let mut targets = Vec::new();
            for reference in &references {
                let (repository, artefact) = doc
                    .find(reference)
                    .ok_or_else(|| Error::NotFound(reference.to_string()))?;
                let target = (repository.name.clone(), artefact.name.clone());
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }

            for (repository, name) in &targets {
                if let Some(r) = doc.repository_mut(repository) {
                    r.artefacts.retain(|a| &a.name != name);
                }
                info!("Removed {} from {}", name, repository);
            }
            doc.repositories.retain(|r| !r.artefacts.is_empty());

            let mut removed = Vec::new();
            let mut seen = HashSet::new();
            for (_, name) in targets {
                if !seen.insert(name.clone()) || doc.references(&name) {
                    continue;
                }
                for path in [self.archive_path(&name), self.seal_path(&name)] {
                    match fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                debug!("Deleted files of {}", name);
                removed.push(name);
            }
            Ok(removed)
        })
    }

    /// Check the digest and signature of an artefact
    pub fn verify(&self, reference: &str, verifier: &dyn SealVerifier) -> Result<Seal> {
        let (_, artefact) = self.find(reference)?;
        let seal = Seal::load(&self.seal_path(&artefact.name))?;
        seal.verify(&self.archive_path(&artefact.name), verifier)?;
        info!("Verified {}", artefact.name);
        Ok(seal)
    }

    /// Verify an artefact, then extract its archive into `dest`
    pub fn open_artefact(
        &self,
        reference: &str,
        verifier: &dyn SealVerifier,
        dest: &Path,
    ) -> Result<Seal> {
        let seal = self.verify(reference, verifier)?;
        extract_zip(&self.archive_path(&seal.manifest.name), dest)?;
        info!("Opened {} into {}", seal.manifest.name, dest.display());
        Ok(seal)
    }

    /// Run `f` under the in-process mutex and the file lock
    fn locked<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self
            .guard
            .lock()
            .map_err(|_| Error::IoError("registry mutex poisoned".to_string()))?;
        let _lock = RegistryLock::acquire(&self.home.join(LOCK_FILE))?;
        f()
    }

    /// Load, mutate and save under both locks
    fn mutate<T>(&self, f: impl FnOnce(&mut RegistryDocument) -> Result<T>) -> Result<T> {
        self.locked(|| {
            let mut doc = self.load()?;
            let result = f(&mut doc)?;
            self.save(&doc)?;
            Ok(result)
        })
    }

    /// Replace the document through a temporary file
    fn save(&self, doc: &RegistryDocument) -> Result<()> {
        let path = self.home.join(REGISTRY_FILE);
        let temp = self
            .home
            .join(format!(".{}.{}.tmp", REGISTRY_FILE, uuid::Uuid::new_v4().simple()));
        fs::write(&temp, serde_json::to_vec_pretty(doc)?)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(Error::IoError(format!(
                "cannot replace {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }
}

/// Append an artefact to `repository`, creating the repository if needed
fn record(
    doc: &mut RegistryDocument,
    repository: &str,
    content_name: &str,
    tag: &str,
) -> Result<Artefact> {
    if doc.repository(repository).is_none() {
        doc.repositories.push(Repository {
            name: repository.to_string(),
            artefacts: Vec::new(),
        });
    }
    let repo = doc
        .repository_mut(repository)
        .ok_or_else(|| Error::NotFound(repository.to_string()))?;
    repo.artefacts.push(Artefact {
        name: content_name.to_string(),
        tags: vec![content_name.to_string()],
    });
    repo.attach_tag(content_name, tag);

    info!("Added {} to {} as '{}'", content_name, repository, tag);
    repo.artefact(content_name)
        .cloned()
        .ok_or_else(|| Error::NotFound(content_name.to_string()))
}

/// Move files an add already stored back to where it found them
fn restore(moves: &[(&Path, &Path)]) {
    for (original, stored) in moves {
        if original.exists() || !stored.exists() {
            continue;
        }
        match move_file_atomic(stored, original) {
            Ok(()) => debug!("Restored {}", original.display()),
            Err(e) => warn!("Cannot restore {}: {}", original.display(), e),
        }
    }
}

/// Extract a zip archive with every entry confined to `dest`
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_err)?;
    fs::create_dir_all(dest)?;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        let target = safe_join(dest, entry.name())?;
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }
    Ok(())
}

fn zip_err(e: zip::result::ZipError) -> Error {
    Error::IoError(format!("zip error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Drop a fake archive and seal pair into `dir`
    fn stage_artefact(dir: &Path, name: &str) -> PathBuf {
        let archive = dir.join(format!("{}.zip", name));
        fs::write(&archive, format!("archive {}", name)).unwrap();
        fs::write(dir.join(format!("{}.json", name)), "{}").unwrap();
        archive
    }

    fn setup() -> (TempDir, TempDir, Registry) {
        let home = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        let registry = Registry::open(home.path()).unwrap();
        (home, work, registry)
    }

    #[test]
    fn test_add_derives_latest() {
        let (_home, work, registry) = setup();
        let archive = stage_artefact(work.path(), "010126-aaaa");

        let artefact = registry.add(&archive, "myrepo", None).unwrap();
        assert_eq!(artefact.name, "010126-aaaa");
        assert_eq!(artefact.tags, vec!["010126-aaaa", "latest"]);

        assert!(!archive.exists());
        assert!(registry.archive_path("010126-aaaa").exists());
        assert!(registry.seal_path("010126-aaaa").exists());

        let doc = registry.load().unwrap();
        assert_eq!(doc.repositories.len(), 1);
        assert_eq!(doc.repositories[0].name, "myrepo");
    }

    #[test]
    fn test_add_explicit_and_profile_tags() {
        let (_home, work, registry) = setup();
        let a = registry
            .add(&stage_artefact(work.path(), "a1"), "myrepo:v1", None)
            .unwrap();
        assert_eq!(a.tags, vec!["a1", "v1"]);

        let b = registry
            .add(&stage_artefact(work.path(), "b1"), "myrepo", Some("linux"))
            .unwrap();
        assert_eq!(b.tags, vec!["b1", "latest-linux"]);
    }

    #[test]
    fn test_add_rejects_malformed_tag_and_non_archive() {
        let (_home, work, registry) = setup();
        let archive = stage_artefact(work.path(), "c1");
        assert!(matches!(
            registry.add(&archive, "myrepo:v1:v2", None),
            Err(Error::MalformedTag(_))
        ));

        let text = work.path().join("c1.txt");
        fs::write(&text, "x").unwrap();
        assert!(matches!(
            registry.add(&text, "myrepo", None),
            Err(Error::RegistryFormat(_))
        ));

        // nothing moved, nothing written
        assert!(archive.exists());
        assert!(!registry.home().join(REGISTRY_FILE).exists());
    }

    #[test]
    fn test_duplicate_leaves_registry_unchanged() {
        let (_home, work, registry) = setup();
        registry
            .add(&stage_artefact(work.path(), "d1"), "myrepo", None)
            .unwrap();
        let before = fs::read(registry.home().join(REGISTRY_FILE)).unwrap();

        let again = stage_artefact(work.path(), "d1");
        let err = registry.add(&again, "myrepo:v2", None).unwrap_err();
        assert!(matches!(err, Error::DuplicateArtefact { .. }));
        assert_eq!(fs::read(registry.home().join(REGISTRY_FILE)).unwrap(), before);
        assert!(again.exists());
    }

    #[test]
    fn test_failed_add_restores_files() {
        let (_home, work, registry) = setup();
        let archive = stage_artefact(work.path(), "010126-aaaa");
        let seal = archive.with_extension("json");
        // a directory in the seal's place makes the second move fail
        fs::create_dir(registry.seal_path("010126-aaaa")).unwrap();

        assert!(registry.add(&archive, "myrepo", None).is_err());
        assert!(archive.exists());
        assert!(seal.exists());
        assert!(!registry.archive_path("010126-aaaa").exists());
        assert!(registry.load().unwrap().repositories.is_empty());

        fs::remove_dir(registry.seal_path("010126-aaaa")).unwrap();
        registry.add(&archive, "myrepo", None).unwrap();
        assert!(registry.archive_path("010126-aaaa").exists());
    }

    #[test]
    fn test_latest_moves_to_newest() {
        let (_home, work, registry) = setup();
        registry
            .add(&stage_artefact(work.path(), "e1"), "myrepo", None)
            .unwrap();
        registry
            .add(&stage_artefact(work.path(), "e2"), "myrepo", None)
            .unwrap();

        assert_eq!(registry.get("myrepo", "e1").unwrap().unwrap().tags, vec!["e1"]);
        assert_eq!(
            registry.get("myrepo", "e2").unwrap().unwrap().tags,
            vec!["e2", "latest"]
        );
        assert_eq!(registry.find("myrepo").unwrap().1.name, "e2");
        assert_eq!(registry.find("myrepo:e1").unwrap().1.name, "e1");
        assert!(matches!(registry.find("myrepo:nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_tag_within_and_across_repositories() {
        let (_home, work, registry) = setup();
        registry
            .add(&stage_artefact(work.path(), "f1"), "app", None)
            .unwrap();

        registry.tag("app", "app:stable").unwrap();
        assert_eq!(
            registry.get("app", "f1").unwrap().unwrap().tags,
            vec!["f1", "latest", "stable"]
        );

        registry.tag("app:stable", "release:1.0").unwrap();
        assert_eq!(
            registry.get("release", "f1").unwrap().unwrap().tags,
            vec!["f1", "1.0"]
        );
        assert_eq!(registry.list().unwrap().len(), 2);
    }

    #[test]
    fn test_remove_keeps_shared_files() {
        let (_home, work, registry) = setup();
        registry
            .add(&stage_artefact(work.path(), "g1"), "app", None)
            .unwrap();
        registry.tag("app", "mirror").unwrap();

        let removed = registry.remove(&["app"]).unwrap();
        assert!(removed.is_empty());
        assert!(registry.archive_path("g1").exists());
        assert!(registry.load().unwrap().repository("app").is_none());

        let removed = registry.remove(&["mirror:g1"]).unwrap();
        assert_eq!(removed, vec!["g1"]);
        assert!(!registry.archive_path("g1").exists());
        assert!(!registry.seal_path("g1").exists());
        assert!(registry.load().unwrap().repositories.is_empty());
    }

    #[test]
    fn test_remove_unknown_reference_changes_nothing() {
        let (_home, work, registry) = setup();
        registry
            .add(&stage_artefact(work.path(), "h1"), "app", None)
            .unwrap();
        assert!(registry.remove(&["app", "ghost"]).is_err());
        assert!(registry.get("app", "h1").unwrap().is_some());
    }

    #[test]
    fn test_list_without_seal_metadata() {
        let (_home, work, registry) = setup();
        registry
            .add(&stage_artefact(work.path(), "i1"), "app:v3", None)
            .unwrap();
        let rows = registry.list().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].repository, "app");
        assert_eq!(rows[0].tags, vec!["v3"]);
        assert_eq!(rows[0].size, "");
    }
}
