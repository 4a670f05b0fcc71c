// src/commands/keys.rs

//! Key commands - generate, import and export key pairs

use anyhow::{Context, Result};
use art::config::MAX_KEY_BITS;
use art::crypto::{LegacyPrivateKey, PgpKey};
use art::keys::key_slot;
use art::ArtConfig;
use std::fs;
use std::path::Path;
use tracing::info;

/// Generate a PGP key pair into its slot
pub fn cmd_key_gen(
    home: &Path,
    group: Option<&str>,
    name: Option<&str>,
    bits: Option<usize>,
    passphrase: Option<&str>,
) -> Result<()> {
    let config = ArtConfig::load(home)?;
    let keys_dir = config.keys_dir();
    let bits = bits.unwrap_or(config.default_key_bits);
    if bits > MAX_KEY_BITS {
        anyhow::bail!("Key size {} exceeds the maximum of {} bits", bits, MAX_KEY_BITS);
    }

    let private_path = key_slot(&keys_dir, group, name, true);
    let public_path = key_slot(&keys_dir, group, name, false);
    if private_path.exists() || public_path.exists() {
        anyhow::bail!("A key pair already exists at {}", private_path.display());
    }

    let owner = owner_name(group, name);
    println!("Generating {}-bit key pair for {}...", bits, owner);
    let key = PgpKey::generate(&owner, "art signing key", "", bits, passphrase)
        .with_context(|| format!("Failed to generate key for {}", owner))?;

    key.save_private(&private_path)?;
    key.save_public(&public_path)?;
    info!("Wrote key pair {}", key.fingerprint());

    println!("[OK] Fingerprint: {}", key.fingerprint());
    println!("  Private: {}", private_path.display());
    println!("  Public:  {}", public_path.display());
    Ok(())
}

/// Copy an armored key into its slot after checking that it parses
pub fn cmd_key_import(
    home: &Path,
    file: &Path,
    group: Option<&str>,
    name: Option<&str>,
    private: bool,
) -> Result<()> {
    let config = ArtConfig::load(home)?;
    let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let key = PgpKey::from_bytes(&data, None)
        .with_context(|| format!("{} is not a usable PGP key", file.display()))?;
    if private && !key.has_private() {
        anyhow::bail!("{} holds no private key", file.display());
    }

    let dest = key_slot(&config.keys_dir(), group, name, private);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if private {
        // keep the original bytes so an encrypted key stays encrypted
        fs::write(&dest, &data)?;
        restrict(&dest)?;
    } else {
        key.public_key().save_public(&dest)?;
    }

    println!("Imported {} as {}", key.fingerprint(), dest.display());
    Ok(())
}

/// Write the public key of a slot to `dest`
pub fn cmd_key_export(
    home: &Path,
    dest: &Path,
    group: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let config = ArtConfig::load(home)?;
    let source = key_slot(&config.keys_dir(), group, name, false);
    let key = PgpKey::load(&source, None)
        .with_context(|| format!("Failed to load {}", source.display()))?;

    fs::write(dest, key.armored_public()?)
        .with_context(|| format!("Failed to write {}", dest.display()))?;
    println!("Exported {} to {}", key.fingerprint(), dest.display());
    Ok(())
}

/// Generate a PEM RSA key pair for legacy seal signing
pub fn cmd_legacy_key_gen(home: &Path, dir: &Path, bits: Option<usize>) -> Result<()> {
    let config = ArtConfig::load(home)?;
    let bits = bits.unwrap_or(config.default_key_bits);

    println!("Generating {}-bit RSA key pair...", bits);
    let key = LegacyPrivateKey::generate(bits)?;
    key.save_pair(dir)
        .with_context(|| format!("Failed to write keys to {}", dir.display()))?;
    println!("[OK] Keys written to {}", dir.display());
    Ok(())
}

fn owner_name(group: Option<&str>, name: Option<&str>) -> String {
    match (group.filter(|g| !g.is_empty()), name.filter(|n| !n.is_empty())) {
        (Some(group), Some(name)) => format!("{}/{}", group, name),
        (Some(group), None) => group.to_string(),
        (None, _) => "root".to_string(),
    }
}

#[cfg(unix)]
fn restrict(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict(_path: &Path) -> Result<()> {
    Ok(())
}
