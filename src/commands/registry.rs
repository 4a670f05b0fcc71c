// src/commands/registry.rs

//! Registry commands - list, tag, remove, verify and open artefacts

use super::open_home;
use anyhow::{Context, Result};
use art::crypto::{LegacyPublicKey, SealVerifier};
use art::{KeyIndex, NameTag};
use std::path::Path;

/// List artefacts as a table
pub fn cmd_list(home: &Path) -> Result<()> {
    let (_, registry) = open_home(home)?;
    let rows = registry.list()?;

    if rows.is_empty() {
        println!("No artefacts in {}", registry.home().display());
        return Ok(());
    }

    let repo_width = rows.iter().map(|r| r.repository.len()).max().unwrap_or(0).max(10);
    let tag_width = rows
        .iter()
        .map(|r| r.tags.join(", ").len())
        .max()
        .unwrap_or(0)
        .max(3);
    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(8);

    println!(
        "{:<repo_width$}  {:<tag_width$}  {:<name_width$}  {:>9}  CREATED",
        "REPOSITORY", "TAG", "ARTEFACT", "SIZE"
    );
    for row in &rows {
        println!(
            "{:<repo_width$}  {:<tag_width$}  {:<name_width$}  {:>9}  {}",
            row.repository,
            row.tags.join(", "),
            row.name,
            row.size,
            row.created
        );
    }
    Ok(())
}

/// Tag an existing artefact
pub fn cmd_tag(home: &Path, source: &str, target: &str) -> Result<()> {
    let (_, registry) = open_home(home)?;
    registry
        .tag(source, target)
        .with_context(|| format!("Failed to tag {} as {}", source, target))?;
    println!("Tagged {} as {}", source, target);
    Ok(())
}

/// Remove artefacts
pub fn cmd_remove(home: &Path, names: &[String]) -> Result<()> {
    let (_, registry) = open_home(home)?;
    let references: Vec<&str> = names.iter().map(String::as_str).collect();
    let deleted = registry.remove(&references)?;

    println!("Removed {}", names.join(", "));
    for name in deleted {
        println!("  deleted {}", name);
    }
    Ok(())
}

/// Verify an artefact's seal
pub fn cmd_verify(home: &Path, name: &str, pem: Option<&Path>) -> Result<()> {
    let (config, registry) = open_home(home)?;
    let verifier = verifier_for(&config.keys_dir(), name, pem)?;
    let seal = registry
        .verify(name, verifier.as_ref())
        .with_context(|| format!("Failed to verify {}", name))?;

    println!("[OK] {} is intact", seal.manifest.name);
    println!("  Source: {}", seal.manifest.source);
    if !seal.manifest.commit.is_empty() {
        println!("  Commit: {}", seal.manifest.commit);
    }
    println!("  Digest: {}", seal.digest);
    Ok(())
}

/// Verify an artefact and extract it into `dest`
pub fn cmd_open(home: &Path, name: &str, dest: &Path, pem: Option<&Path>) -> Result<()> {
    let (config, registry) = open_home(home)?;
    let verifier = verifier_for(&config.keys_dir(), name, pem)?;
    let seal = registry
        .open_artefact(name, verifier.as_ref(), dest)
        .with_context(|| format!("Failed to open {}", name))?;

    println!("Opened {} into {}", seal.manifest.name, dest.display());
    Ok(())
}

/// Public key that should have signed the artefacts of `reference`
fn verifier_for(keys_dir: &Path, reference: &str, pem: Option<&Path>) -> Result<Box<dyn SealVerifier>> {
    if let Some(pem) = pem {
        let key = LegacyPublicKey::load(pem)
            .with_context(|| format!("Failed to load {}", pem.display()))?;
        return Ok(Box::new(key));
    }

    let reference = NameTag::parse(reference)?;
    let keys = KeyIndex::scan(keys_dir)?;
    let key = keys
        .resolve(&reference.repository, false, None)
        .with_context(|| format!("No public key for {}", reference.repository))?;
    Ok(Box::new(key))
}
