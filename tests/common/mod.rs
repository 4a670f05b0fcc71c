// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use art::build::archive::{IgnoreList, archive_target};
use art::keys::key_slot;
use art::{ArtConfig, Manifest, PgpKey, Seal};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// A registry home with its own work root and fast target polling.
///
/// Returns (TempDir, config) - keep the TempDir alive to prevent cleanup.
pub fn setup_home() -> (TempDir, ArtConfig) {
    let temp_dir = tempfile::tempdir().unwrap();
    let work_root = temp_dir.path().join("work");
    fs::create_dir_all(&work_root).unwrap();

    let mut config = ArtConfig::with_home(temp_dir.path().join("home"));
    config.work_root = Some(work_root);
    config.target_poll_attempts = 3;
    config.target_poll_interval = Duration::from_millis(20);
    (temp_dir, config)
}

/// Generate a key pair into the slot for `group`/`name`
pub fn install_key(config: &ArtConfig, group: Option<&str>, name: Option<&str>) -> PgpKey {
    let key = PgpKey::generate("art-test", "integration", "test@example.com", 2048, None).unwrap();
    key.save_private(&key_slot(&config.keys_dir(), group, name, true))
        .unwrap();
    key.save_public(&key_slot(&config.keys_dir(), group, name, false))
        .unwrap();
    key
}

/// Write a source tree holding `descriptor` as its package.yaml
pub fn write_source(dir: &Path, descriptor: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("package.yaml"), descriptor).unwrap();
}

/// Number of entries left under the work root
pub fn work_root_entries(config: &ArtConfig) -> usize {
    fs::read_dir(config.work_root.as_ref().unwrap())
        .unwrap()
        .count()
}

/// Create `<dir>/<name>.zip` and its seal signed by `key`
pub fn sealed_archive(dir: &Path, name: &str, key: &PgpKey) -> PathBuf {
    let content = dir.join(format!("{}-content", name));
    fs::create_dir_all(&content).unwrap();
    fs::write(content.join("app.txt"), format!("payload of {}", name)).unwrap();

    let archive = dir.join(format!("{}.zip", name));
    archive_target(&content, &archive, &IgnoreList::default(), true).unwrap();

    let manifest = Manifest {
        kind: "test".to_string(),
        license: "MIT".to_string(),
        name: name.to_string(),
        profile: "default".to_string(),
        source: dir.display().to_string(),
        target: "content".to_string(),
        time: "2024-01-01T00:00:00+00:00".to_string(),
        size: "1.0 KB".to_string(),
        ..Default::default()
    };
    Seal::create(&archive, manifest, key)
        .unwrap()
        .save(&archive.with_extension("json"))
        .unwrap();
    archive
}
