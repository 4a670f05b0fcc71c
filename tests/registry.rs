// tests/registry.rs

//! Registry tests against real sealed archives.

mod common;

use art::{Error, PgpKey, Registry};
use common::sealed_archive;
use tempfile::TempDir;

fn signing_key() -> PgpKey {
    PgpKey::generate("registry-test", "", "", 2048, None).unwrap()
}

#[test]
fn test_tag_across_repositories_shares_files() {
    let temp_dir = TempDir::new().unwrap();
    let key = signing_key();
    let registry = Registry::open(temp_dir.path().join("home")).unwrap();

    let archive = sealed_archive(temp_dir.path(), "010124120000000-abcdef0123", &key);
    registry.add(&archive, "acme/web", None).unwrap();
    registry.tag("acme/web", "mirror/web:stable").unwrap();

    let (repository, artefact) = registry.find("mirror/web:stable").unwrap();
    assert_eq!(repository, "mirror/web");
    assert_eq!(artefact.name, "010124120000000-abcdef0123");
    registry
        .verify("mirror/web:stable", &key.public_key())
        .unwrap();

    // removing one listing keeps the files for the other
    let deleted = registry.remove(&["acme/web"]).unwrap();
    assert!(deleted.is_empty());
    assert!(registry.archive_path(&artefact.name).exists());
    registry
        .verify("mirror/web:stable", &key.public_key())
        .unwrap();

    let deleted = registry.remove(&["mirror/web:stable"]).unwrap();
    assert_eq!(deleted, vec![artefact.name.clone()]);
    assert!(!registry.archive_path(&artefact.name).exists());
    assert!(!registry.seal_path(&artefact.name).exists());
    assert!(registry.load().unwrap().repositories.is_empty());
}

#[test]
fn test_latest_moves_to_newest_artefact() {
    let temp_dir = TempDir::new().unwrap();
    let key = signing_key();
    let registry = Registry::open(temp_dir.path().join("home")).unwrap();

    let first = sealed_archive(temp_dir.path(), "first", &key);
    let second = sealed_archive(temp_dir.path(), "second", &key);
    registry.add(&first, "acme/web", None).unwrap();
    registry.add(&second, "acme/web", None).unwrap();

    assert_eq!(registry.find("acme/web").unwrap().1.name, "second");
    assert_eq!(registry.find("acme/web:first").unwrap().1.name, "first");

    let rows = registry.list().unwrap();
    assert_eq!(rows.len(), 2);
    let first_row = rows.iter().find(|r| r.name == "first").unwrap();
    assert!(first_row.tags.is_empty());
    assert_eq!(first_row.size, "1.0 KB");
    let second_row = rows.iter().find(|r| r.name == "second").unwrap();
    assert_eq!(second_row.tags, vec!["latest".to_string()]);
}

#[test]
fn test_duplicate_add_leaves_files_in_place() {
    let temp_dir = TempDir::new().unwrap();
    let key = signing_key();
    let registry = Registry::open(temp_dir.path().join("home")).unwrap();

    let archive = sealed_archive(temp_dir.path(), "build-1", &key);
    registry.add(&archive, "acme/web", None).unwrap();

    let again = sealed_archive(temp_dir.path(), "build-1", &key);
    let err = registry.add(&again, "acme/web:v2", None).unwrap_err();
    assert!(matches!(err, Error::DuplicateArtefact { .. }));
    assert!(again.exists());
    assert!(again.with_extension("json").exists());
    assert!(registry.find("acme/web:v2").is_err());
}

#[test]
fn test_open_extracts_verified_archive() {
    let temp_dir = TempDir::new().unwrap();
    let key = signing_key();
    let other = signing_key();
    let registry = Registry::open(temp_dir.path().join("home")).unwrap();

    let archive = sealed_archive(temp_dir.path(), "build-7", &key);
    registry.add(&archive, "acme/api:v7", None).unwrap();

    let refused = temp_dir.path().join("refused");
    assert!(matches!(
        registry.open_artefact("acme/api:v7", &other.public_key(), &refused),
        Err(Error::VerificationFailed(_))
    ));
    assert!(!refused.exists());

    let dest = temp_dir.path().join("opened");
    let seal = registry
        .open_artefact("acme/api:v7", &key.public_key(), &dest)
        .unwrap();
    assert_eq!(seal.manifest.name, "build-7");
    assert_eq!(
        std::fs::read_to_string(dest.join("build-7-content/app.txt")).unwrap(),
        "payload of build-7"
    );
}

#[test]
fn test_concurrent_adds_keep_every_entry() {
    const WRITERS: usize = 8;
    let temp_dir = TempDir::new().unwrap();
    let key = signing_key();
    let home = temp_dir.path().join("home");
    let archives: Vec<_> = (0..WRITERS)
        .map(|i| sealed_archive(temp_dir.path(), &format!("build-{}", i), &key))
        .collect();

    // every writer opens its own handle so only the file lock serializes them
    std::thread::scope(|scope| {
        for archive in &archives {
            let home = &home;
            scope.spawn(move || {
                Registry::open(home)
                    .unwrap()
                    .add(archive, "acme/web", None)
                    .unwrap();
            });
        }
    });

    let registry = Registry::open(&home).unwrap();
    let doc = registry.load().unwrap();
    assert_eq!(doc.repositories.len(), 1);
    assert_eq!(doc.repositories[0].artefacts.len(), WRITERS);
    for i in 0..WRITERS {
        let name = format!("build-{}", i);
        assert!(registry.archive_path(&name).exists());
        registry.verify(&format!("acme/web:{}", name), &key.public_key()).unwrap();
    }
    let latest = doc.repositories[0]
        .artefacts
        .iter()
        .filter(|a| a.tags.iter().any(|t| t == "latest"))
        .count();
    assert_eq!(latest, 1);
}
